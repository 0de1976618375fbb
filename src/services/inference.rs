use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use std::io::Cursor;

use crate::models::restoration::RestorationModel;

/// The restoration engine. Given image bytes, returns restored image bytes
/// in the same format.
#[async_trait]
pub trait Restorer: Send + Sync {
    async fn restore(&self, image: &[u8], model: RestorationModel) -> Result<Vec<u8>, RestoreError>;
}

/// Client for a remote inference service.
pub struct HttpRestorer {
    http: Client,
    endpoint: String,
}

impl HttpRestorer {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Restorer for HttpRestorer {
    async fn restore(&self, image: &[u8], model: RestorationModel) -> Result<Vec<u8>, RestoreError> {
        let url = format!("{}/restore", self.endpoint);

        let response = self
            .http
            .post(&url)
            .query(&[("model", model.as_ref())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// In-process engine built on classic image filters. Runs on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRestorer;

#[async_trait]
impl Restorer for LocalRestorer {
    async fn restore(&self, image: &[u8], model: RestorationModel) -> Result<Vec<u8>, RestoreError> {
        let image = image.to_vec();
        tokio::task::spawn_blocking(move || filter_image(&image, model)).await?
    }
}

fn filter_image(bytes: &[u8], model: RestorationModel) -> Result<Vec<u8>, RestoreError> {
    let format = image::guess_format(bytes)?;
    let decoded = image::load_from_memory_with_format(bytes, format)?;

    let restored = match model {
        RestorationModel::Derain => decoded.blur(0.8),
        RestorationModel::Defocus => decoded.unsharpen(2.0, 2),
        RestorationModel::Deblur => decoded.unsharpen(1.2, 1),
    };

    // JPEG has no alpha channel
    let restored = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(restored.to_rgb8()),
        _ => restored,
    };

    let mut out = Cursor::new(Vec::new());
    restored.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Inference task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn sample_png() -> Vec<u8> {
        let img = ImageBuffer::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255u8, 255, 255])
            } else {
                Rgb([0u8, 0, 0])
            }
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_local_restorer_keeps_format_and_size() {
        let input = sample_png();
        let output = LocalRestorer
            .restore(&input, RestorationModel::Derain)
            .await
            .unwrap();

        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
        assert_ne!(output, input);
    }

    #[tokio::test]
    async fn test_local_restorer_rejects_garbage() {
        let err = LocalRestorer
            .restore(b"definitely not an image", RestorationModel::Deblur)
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::Image(_)));
    }
}

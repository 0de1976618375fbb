use image::ImageFormat;

/// Content subtypes accepted for upload.
const ALLOWED_SUBTYPES: &[&str] = &["jpeg", "jpg", "png"];

/// An upload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    /// File extension derived from the declared content type.
    pub extension: String,
}

/// Check an upload before anything is admitted or stored.
///
/// Size is checked first, then the declared content type, then the bytes
/// are sniffed and must agree with the declaration.
pub fn validate_upload(
    data: &[u8],
    content_type: Option<&str>,
    max_size: usize,
) -> Result<ValidatedUpload, ValidationError> {
    if data.len() > max_size {
        return Err(ValidationError::TooLarge {
            size: data.len(),
            max: max_size,
        });
    }

    let content_type = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .ok_or(ValidationError::MissingContentType)?;

    let subtype = content_type
        .split(';')
        .next()
        .and_then(|essence| essence.split_once('/'))
        .map(|(_, sub)| sub.trim().to_ascii_lowercase())
        .ok_or_else(|| ValidationError::UnsupportedContentType(content_type.to_string()))?;

    if !ALLOWED_SUBTYPES.contains(&subtype.as_str()) {
        return Err(ValidationError::UnsupportedContentType(content_type.to_string()));
    }

    let declared = if subtype == "png" {
        ImageFormat::Png
    } else {
        ImageFormat::Jpeg
    };
    match image::guess_format(data) {
        Ok(sniffed) if sniffed == declared => {}
        _ => return Err(ValidationError::ContentMismatch(content_type.to_string())),
    }

    Ok(ValidatedUpload { extension: subtype })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Request body exceeds the upload limit")]
    BodyLimitExceeded,

    #[error("Missing content type")]
    MissingContentType,

    #[error("Unsupported content type {0:?}")]
    UnsupportedContentType(String),

    #[error("File contents do not match content type {0:?}")]
    ContentMismatch(String),

    #[error("Unknown restoration model {0:?}")]
    UnknownModel(String),

    #[error("Missing file field")]
    MissingFile,

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

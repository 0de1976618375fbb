//! Test images generated in memory

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;

/// Deterministic noisy RGB image; noise keeps the JPEG from compressing to nothing.
fn noisy_image(width: u32, height: u32) -> DynamicImage {
    let mut seed: u32 = 0x2545_F491;
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let noise = (seed & 0x3F) as u8;
        Rgb([
            (x as u8).wrapping_mul(3).wrapping_add(noise),
            (y as u8).wrapping_mul(5).wrapping_add(noise),
            noise.wrapping_mul(4),
        ])
    });
    DynamicImage::ImageRgb8(img)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

/// A small photo-like JPEG, on the order of 10 KB.
pub fn sample_jpeg() -> Vec<u8> {
    encode(&noisy_image(96, 96), ImageFormat::Jpeg)
}

pub fn sample_png() -> Vec<u8> {
    encode(&noisy_image(24, 24), ImageFormat::Png)
}

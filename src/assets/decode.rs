use std::io::Cursor;

use anyhow::Context as _;
use image::ImageDecoder as _;

use crate::foundation::error::{VidmarkError, VidmarkResult};

/// Decode encoded image bytes into straight-alpha RGBA8, applying any embedded orientation
/// (EXIF) so the result is upright.
pub fn decode_image(bytes: &[u8]) -> VidmarkResult<image::RgbaImage> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("sniff watermark image format")?;
    let mut decoder = reader.into_decoder().map_err(|e| {
        VidmarkError::overlay(format!("unsupported or corrupt watermark image: {e}"))
    })?;
    let orientation = decoder
        .orientation()
        .unwrap_or(image::metadata::Orientation::NoTransforms);
    let mut img = image::DynamicImage::from_decoder(decoder)
        .map_err(|e| VidmarkError::overlay(format!("failed to decode watermark image: {e}")))?;
    img.apply_orientation(orientation);

    let rgba = img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(VidmarkError::overlay("watermark image has zero size"));
    }
    Ok(rgba)
}

/// Encode straight-alpha RGBA8 as PNG bytes.
pub fn encode_png(img: image::RgbaImage) -> VidmarkResult<Vec<u8>> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode png")?;
    Ok(buf)
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;

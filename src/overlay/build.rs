use std::sync::Arc;

use image::imageops::FilterType;

use crate::assets::decode::decode_image;
use crate::assets::text::TextRasterizer;
use crate::foundation::core::PixelSize;
use crate::foundation::error::VidmarkResult;
use crate::foundation::math::premultiply_rgba8_in_place;
use crate::overlay::placement::OverlayPosition;
use crate::request::model::{ComposeRequest, WatermarkSource};

/// Positioned watermark, built once per job and shared read-only by every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayImage {
    pub size: PixelSize,
    /// Premultiplied RGBA8, row-major, y-down.
    pub rgba8_premul: Arc<Vec<u8>>,
    pub position: OverlayPosition,
}

impl OverlayImage {
    /// Top-left corner in a y-down raster of `canvas` size.
    pub fn raster_origin(&self, canvas: PixelSize) -> (i64, i64) {
        self.position.raster_origin(canvas, self.size)
    }
}

/// Build the overlay for `req` on a canvas of `render_size`.
///
/// Returns `Ok(None)` when the request carries neither image bytes nor non-blank text.
pub fn build_overlay(
    req: &ComposeRequest,
    render_size: PixelSize,
    rasterizer: &dyn TextRasterizer,
) -> VidmarkResult<Option<OverlayImage>> {
    let Some(source) = req.watermark_source() else {
        return Ok(None);
    };

    let decoded = match source {
        WatermarkSource::Image(bytes) => decode_image(bytes)?,
        WatermarkSource::Text(text) => {
            let png = rasterizer.rasterize(text, &req.text_style)?;
            decode_image(&png)?
        }
    };

    let (src_w, src_h) = decoded.dimensions();
    let target_w = ((req.width_percent * f64::from(render_size.width)).round() as u32).max(1);
    let target_h =
        ((f64::from(src_h) * f64::from(target_w) / f64::from(src_w)).round() as u32).max(1);

    let scaled = if (target_w, target_h) == (src_w, src_h) {
        decoded
    } else {
        image::imageops::resize(&decoded, target_w, target_h, FilterType::Lanczos3)
    };

    let mut rgba = scaled.into_raw();
    apply_opacity(&mut rgba, req.opacity);
    premultiply_rgba8_in_place(&mut rgba);

    let size = PixelSize::new(target_w, target_h);
    let position = req.placement.resolve(render_size, size);
    tracing::debug!(
        w = size.width,
        h = size.height,
        x = position.x,
        y = position.y,
        "built overlay"
    );

    Ok(Some(OverlayImage {
        size,
        rgba8_premul: Arc::new(rgba),
        position,
    }))
}

/// Scale straight alpha by `opacity`, leaving color channels untouched.
fn apply_opacity(rgba: &mut [u8], opacity: f64) {
    if opacity >= 1.0 {
        return;
    }
    let k = opacity.clamp(0.0, 1.0);
    for px in rgba.chunks_exact_mut(4) {
        px[3] = (f64::from(px[3]) * k).round() as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/build.rs"]
mod tests;

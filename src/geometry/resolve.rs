use crate::foundation::core::{Affine, PixelSize, Rect};
use crate::foundation::error::{VidmarkError, VidmarkResult};
use crate::media::track::VideoTrackDescriptor;

/// Display-oriented canvas size plus the transform that maps raw decoded pixels onto it.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct RenderGeometry {
    /// Raw decoded frame size.
    pub source_size: PixelSize,
    /// Display-oriented canvas size.
    pub render_size: PixelSize,
    /// Maps raw y-down pixel coordinates into render space, content exactly at
    /// `[0, 0] x render_size`.
    pub render_transform: Affine,
}

impl RenderGeometry {
    /// Whether width and height are swapped relative to the raw frame.
    pub fn is_transposed(&self) -> bool {
        self.source_size.width != self.render_size.width
            || self.source_size.height != self.render_size.height
    }
}

const SNAP_EPSILON: f64 = 1e-9;

/// Resolve the render geometry for a video track.
///
/// Raw frames are y-down while the stored orientation is y-up, so the orientation is wrapped in
/// a flip sized to the raw height and a flip sized to the render height. The result is then
/// translated so that the transformed raw rectangle starts at the origin.
#[tracing::instrument(skip(track), fields(pixel_format = %track.pixel_format))]
pub fn resolve_render_geometry(track: &VideoTrackDescriptor) -> VidmarkResult<RenderGeometry> {
    let raw = true_pixel_size(track)?;
    if track.orientation.determinant().abs() < SNAP_EPSILON {
        return Err(VidmarkError::input(
            "video track orientation transform is degenerate",
        ));
    }

    let raw_rect = Rect::new(0.0, 0.0, f64::from(raw.width), f64::from(raw.height));
    let oriented = track.orientation.transform_rect_bbox(raw_rect);
    let render_size = PixelSize::new(
        oriented.width().abs().round() as u32,
        oriented.height().abs().round() as u32,
    );
    if render_size.is_empty() {
        return Err(VidmarkError::input(format!(
            "video track orientation collapses {}x{} to an empty canvas",
            raw.width, raw.height
        )));
    }

    let to_container = vertical_flip(f64::from(raw.height));
    let from_container = vertical_flip(f64::from(render_size.height));
    let composed = from_container * track.orientation * to_container;

    let placed = composed.transform_rect_bbox(raw_rect);
    let render_transform = snap(Affine::translate(-placed.origin().to_vec2()) * composed);

    tracing::debug!(
        raw_w = raw.width,
        raw_h = raw.height,
        render_w = render_size.width,
        render_h = render_size.height,
        "resolved render geometry"
    );

    Ok(RenderGeometry {
        source_size: raw,
        render_size,
        render_transform,
    })
}

/// Raw pixel size from the format description, falling back to the natural size.
fn true_pixel_size(track: &VideoTrackDescriptor) -> VidmarkResult<PixelSize> {
    if let Some(px) = track.pixel_size
        && !px.is_empty()
    {
        return Ok(px);
    }

    let w = track.natural_size.width.abs().round();
    let h = track.natural_size.height.abs().round();
    if w.is_finite() && h.is_finite() && w >= 1.0 && h >= 1.0 {
        return Ok(PixelSize::new(w as u32, h as u32));
    }

    Err(VidmarkError::input(
        "video track has no usable pixel dimensions",
    ))
}

fn vertical_flip(height: f64) -> Affine {
    Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, height])
}

/// Remove floating-point noise so that quarter-turn transforms stay exact.
fn snap(t: Affine) -> Affine {
    let c = t.as_coeffs().map(|v| {
        let r = v.round();
        if (v - r).abs() < SNAP_EPSILON { r } else { v }
    });
    Affine::new(c)
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/resolve.rs"]
mod tests;

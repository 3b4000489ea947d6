use crate::foundation::core::PixelSize;
use crate::request::model::{Anchor, LengthUnit, OverlayPlacement};

/// Overlay origin on the canvas, in whole pixels.
///
/// Coordinates are y-up: `y` is the distance from the bottom canvas edge to the bottom edge of
/// the overlay. Use [`OverlayPosition::raster_origin`] for y-down buffer offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct OverlayPosition {
    pub x: i64,
    pub y: i64,
}

impl OverlayPosition {
    /// Top-left corner of the overlay in a y-down raster of `canvas` size.
    pub fn raster_origin(self, canvas: PixelSize, overlay: PixelSize) -> (i64, i64) {
        (
            self.x,
            i64::from(canvas.height) - self.y - i64::from(overlay.height),
        )
    }
}

impl OverlayPlacement {
    /// Position an overlay of `overlay` size on a canvas of `canvas` size.
    pub fn resolve(&self, canvas: PixelSize, overlay: PixelSize) -> OverlayPosition {
        let cw = f64::from(canvas.width);
        let ch = f64::from(canvas.height);
        let w = f64::from(overlay.width);
        let h = f64::from(overlay.height);

        let mx = resolve_length(self.margin, self.margin_unit, cw);
        let my = resolve_length(self.margin, self.margin_unit, ch);

        let (x, y) = match self.anchor {
            Anchor::TopLeft => (mx, ch - my - h),
            Anchor::TopRight => (cw - mx - w, ch - my - h),
            Anchor::BottomLeft => (mx, my),
            Anchor::BottomRight => (cw - mx - w, my),
            Anchor::Center => ((cw - w) / 2.0, (ch - h) / 2.0),
        };

        let ox = resolve_length(self.offset_x, self.offset_unit, cw);
        let oy = resolve_length(self.offset_y, self.offset_unit, ch);

        OverlayPosition {
            x: (x + ox).floor() as i64,
            y: (y + oy).floor() as i64,
        }
    }
}

fn resolve_length(value: f64, unit: LengthUnit, extent: f64) -> f64 {
    match unit {
        LengthUnit::Absolute => value,
        LengthUnit::Percent => value * extent,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/placement.rs"]
mod tests;

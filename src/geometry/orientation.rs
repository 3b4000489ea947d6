use crate::foundation::core::{Affine, PixelSize};

/// Normalize a rotation in degrees to one of `0`, `90`, `180`, `270` (clockwise).
///
/// Values are snapped to the nearest quarter turn.
pub fn normalize_quarter_turns(clockwise_degrees: f64) -> u32 {
    if !clockwise_degrees.is_finite() {
        return 0;
    }
    let quarters = (clockwise_degrees / 90.0).round() as i64;
    (quarters.rem_euclid(4) * 90) as u32
}

/// Container orientation transform for a clockwise display rotation.
///
/// The matrix lives in y-up container coordinates (like an MP4 track header matrix) and already
/// carries the translation that keeps the rotated raw rectangle in the positive quadrant.
pub fn orientation_for_rotation(clockwise_degrees: u32, raw: PixelSize) -> Affine {
    let w = f64::from(raw.width);
    let h = f64::from(raw.height);
    match normalize_quarter_turns(f64::from(clockwise_degrees)) {
        90 => Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, w]),
        180 => Affine::new([-1.0, 0.0, 0.0, -1.0, w, h]),
        270 => Affine::new([0.0, 1.0, -1.0, 0.0, h, 0.0]),
        _ => Affine::IDENTITY,
    }
}

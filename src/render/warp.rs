use rayon::prelude::*;

use crate::foundation::core::{Affine, PixelSize};
use crate::foundation::error::{VidmarkError, VidmarkResult};

const OUTSIDE_RGBA: [u8; 4] = [0, 0, 0, 255];

/// Render a raw RGBA8 frame into `dst` through `transform`, cropping to `dst_size`.
///
/// Each destination pixel center is mapped back through the inverse transform and takes the
/// source pixel it lands in. Quarter-turn transforms therefore move pixels without resampling.
pub(crate) fn warp_into(
    src: &[u8],
    src_size: PixelSize,
    transform: Affine,
    dst: &mut [u8],
    dst_size: PixelSize,
) -> VidmarkResult<()> {
    if src.len() != src_size.rgba_len() {
        return Err(VidmarkError::validation(format!(
            "source frame has {} bytes, expected {} for {}x{}",
            src.len(),
            src_size.rgba_len(),
            src_size.width,
            src_size.height
        )));
    }
    if dst.len() != dst_size.rgba_len() {
        return Err(VidmarkError::validation(
            "destination buffer size mismatch with render size",
        ));
    }

    if transform == Affine::IDENTITY && src_size == dst_size {
        dst.copy_from_slice(src);
        return Ok(());
    }

    if transform.determinant().abs() < 1e-12 {
        return Err(VidmarkError::validation("render transform is not invertible"));
    }
    let [a, b, c, d, e, f] = transform.inverse().as_coeffs();
    let sw = i64::from(src_size.width);
    let sh = i64::from(src_size.height);
    let src_row = src_size.width as usize * 4;
    let dst_row = dst_size.width as usize * 4;

    dst.par_chunks_exact_mut(dst_row)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as f64 + 0.5;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let qx = x as f64 + 0.5;
                let sx = (a * qx + c * py + e).floor() as i64;
                let sy = (b * qx + d * py + f).floor() as i64;
                if sx < 0 || sy < 0 || sx >= sw || sy >= sh {
                    px.copy_from_slice(&OUTSIDE_RGBA);
                    continue;
                }
                let off = sy as usize * src_row + sx as usize * 4;
                px.copy_from_slice(&src[off..off + 4]);
            }
        });

    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/render/warp.rs"]
mod tests;

use crate::foundation::math::mul_div255_u16;
use crate::overlay::build::OverlayImage;
use crate::render::buffer_pool::PixelBuffer;

pub type PremulRgba8 = [u8; 4];

/// Premultiplied source-over.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    let sa = u16::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    let inv = 255u16 - sa;
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = add_sat_u8(u16::from(src[i]), mul_div255_u16(u16::from(dst[i]), inv));
    }
    out
}

/// Blend `overlay` onto `frame` at its resolved position, clipping to the frame bounds.
pub fn composite_overlay(frame: &mut PixelBuffer, overlay: &OverlayImage) {
    let canvas = frame.size();
    let (ox, oy) = overlay.raster_origin(canvas);
    let ow = i64::from(overlay.size.width);
    let oh = i64::from(overlay.size.height);
    let cw = i64::from(canvas.width);
    let ch = i64::from(canvas.height);

    let x0 = ox.max(0);
    let y0 = oy.max(0);
    let x1 = (ox + ow).min(cw);
    let y1 = (oy + oh).min(ch);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let src = overlay.rgba8_premul.as_slice();
    let dst = frame.data_mut();
    let span = ((x1 - x0) * 4) as usize;
    for y in y0..y1 {
        let d_off = ((y * cw + x0) * 4) as usize;
        let s_off = (((y - oy) * ow + (x0 - ox)) * 4) as usize;
        let d_row = &mut dst[d_off..d_off + span];
        let s_row = &src[s_off..s_off + span];
        for (d, s) in d_row.chunks_exact_mut(4).zip(s_row.chunks_exact(4)) {
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
            d.copy_from_slice(&out);
        }
    }
}

fn add_sat_u8(a: u16, b: u16) -> u8 {
    (a + b).min(255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;

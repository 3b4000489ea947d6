use super::*;
use crate::foundation::core::Fps;
use crate::geometry::orientation::orientation_for_rotation;
use crate::geometry::resolve::resolve_render_geometry;
use crate::media::track::VideoTrackDescriptor;

fn labelled_frame(size: PixelSize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size.rgba_len());
    for y in 0..size.height {
        for x in 0..size.width {
            out.extend_from_slice(&[x as u8, y as u8, 7, 255]);
        }
    }
    out
}

fn pixel(buf: &[u8], size: PixelSize, x: u32, y: u32) -> [u8; 4] {
    let off = ((y * size.width + x) * 4) as usize;
    [buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]
}

fn warp_rotated(raw: PixelSize, rotation: u32) -> (Vec<u8>, PixelSize) {
    let track = VideoTrackDescriptor {
        pixel_size: Some(raw),
        natural_size: raw.to_size(),
        frame_rate: Fps::new(30, 1).unwrap(),
        orientation: orientation_for_rotation(rotation, raw),
        pixel_format: "rgba".to_string(),
    };
    let g = resolve_render_geometry(&track).unwrap();
    let src = labelled_frame(raw);
    let mut dst = vec![0u8; g.render_size.rgba_len()];
    warp_into(&src, raw, g.render_transform, &mut dst, g.render_size).unwrap();
    (dst, g.render_size)
}

#[test]
fn identity_is_a_plain_copy() {
    let raw = PixelSize::new(3, 2);
    let (dst, size) = warp_rotated(raw, 0);
    assert_eq!(size, raw);
    assert_eq!(dst, labelled_frame(raw));
}

#[test]
fn quarter_turns_move_every_pixel_without_borders() {
    let raw = PixelSize::new(3, 2);
    for rotation in [90, 180, 270] {
        let (dst, size) = warp_rotated(raw, rotation);
        for y in 0..raw.height {
            for x in 0..raw.width {
                let (dx, dy) = match rotation {
                    90 => (raw.height - 1 - y, x),
                    180 => (raw.width - 1 - x, raw.height - 1 - y),
                    _ => (y, raw.width - 1 - x),
                };
                assert_eq!(
                    pixel(&dst, size, dx, dy),
                    [x as u8, y as u8, 7, 255],
                    "rotation {rotation} src ({x},{y})"
                );
            }
        }
        assert!(dst.chunks_exact(4).all(|p| p[2] == 7), "rotation {rotation}");
    }
}

#[test]
fn size_mismatch_is_rejected() {
    let raw = PixelSize::new(2, 2);
    let mut dst = vec![0u8; raw.rgba_len()];
    assert!(warp_into(&[0u8; 3], raw, Affine::IDENTITY, &mut dst, raw).is_err());
}

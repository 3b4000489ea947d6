use super::*;
use crate::assets::decode::encode_png;
use crate::foundation::error::VidmarkError;
use crate::request::model::{Anchor, OverlayPlacement, TextStyle};

struct FixedRaster(Vec<u8>);

impl TextRasterizer for FixedRaster {
    fn rasterize(&self, _text: &str, _style: &TextStyle) -> VidmarkResult<Vec<u8>> {
        Ok(self.0.clone())
    }
}

struct FailingRaster;

impl TextRasterizer for FailingRaster {
    fn rasterize(&self, _text: &str, _style: &TextStyle) -> VidmarkResult<Vec<u8>> {
        Err(VidmarkError::overlay("no fonts"))
    }
}

fn solid_png(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
    encode_png(image::RgbaImage::from_pixel(w, h, image::Rgba(px))).unwrap()
}

fn gradient_png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8, 200])
    });
    encode_png(img).unwrap()
}

fn request_with_image(bytes: Vec<u8>) -> ComposeRequest {
    let mut req = ComposeRequest::new("in.mp4");
    req.image = Some(bytes);
    req
}

#[test]
fn no_source_yields_none() {
    let mut req = ComposeRequest::new("in.mp4");
    req.text = Some("   ".to_string());
    let out = build_overlay(&req, PixelSize::new(640, 360), &FailingRaster).unwrap();
    assert!(out.is_none());
}

#[test]
fn image_is_scaled_to_width_fraction_preserving_aspect() {
    let mut req = request_with_image(gradient_png(40, 20));
    req.width_percent = 0.25;
    let ov = build_overlay(&req, PixelSize::new(640, 360), &FailingRaster)
        .unwrap()
        .unwrap();
    assert_eq!(ov.size, PixelSize::new(160, 80));
    assert_eq!(ov.rgba8_premul.len(), 160 * 80 * 4);
}

#[test]
fn building_twice_is_pixel_identical() {
    let mut req = request_with_image(gradient_png(37, 23));
    req.width_percent = 0.3;
    req.opacity = 0.6;
    req.placement = OverlayPlacement {
        anchor: Anchor::TopRight,
        margin: 0.02,
        margin_unit: crate::request::model::LengthUnit::Percent,
        ..OverlayPlacement::default()
    };
    let canvas = PixelSize::new(1280, 720);
    let a = build_overlay(&req, canvas, &FailingRaster).unwrap().unwrap();
    let b = build_overlay(&req, canvas, &FailingRaster).unwrap().unwrap();
    assert_eq!(a, b);
}

#[test]
fn opacity_scales_alpha_only() {
    let mut req = request_with_image(solid_png(10, 10, [255, 255, 255, 255]));
    req.width_percent = 0.1;
    req.opacity = 0.5;
    let ov = build_overlay(&req, PixelSize::new(100, 100), &FailingRaster)
        .unwrap()
        .unwrap();
    assert_eq!(ov.size, PixelSize::new(10, 10));
    // Straight white at alpha 128 premultiplies to 128 in every channel.
    for px in ov.rgba8_premul.chunks_exact(4) {
        assert_eq!(px, &[128, 128, 128, 128]);
    }
}

#[test]
fn text_goes_through_rasterizer() {
    let mut req = ComposeRequest::new("in.mp4");
    req.text = Some("hello".to_string());
    req.width_percent = 0.5;
    let raster = FixedRaster(solid_png(20, 10, [255, 0, 0, 255]));
    let ov = build_overlay(&req, PixelSize::new(200, 100), &raster)
        .unwrap()
        .unwrap();
    assert_eq!(ov.size, PixelSize::new(100, 50));
    assert_eq!(ov.position, OverlayPosition { x: 100, y: 0 });
    assert_eq!(ov.raster_origin(PixelSize::new(200, 100)), (100, 50));
}

#[test]
fn rasterizer_failure_is_an_overlay_error() {
    let mut req = ComposeRequest::new("in.mp4");
    req.text = Some("hello".to_string());
    let err = build_overlay(&req, PixelSize::new(200, 100), &FailingRaster).unwrap_err();
    assert!(matches!(err, VidmarkError::Overlay(_)));
}

#[test]
fn corrupt_image_is_an_overlay_error() {
    let req = request_with_image(vec![0x89, b'P', b'N', b'G', 0, 1, 2]);
    let err = build_overlay(&req, PixelSize::new(200, 100), &FailingRaster).unwrap_err();
    assert!(matches!(err, VidmarkError::Overlay(_)));
}

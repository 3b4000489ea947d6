use super::*;

fn placement(anchor: Anchor, margin: f64, unit: LengthUnit) -> OverlayPlacement {
    OverlayPlacement {
        anchor,
        margin,
        margin_unit: unit,
        ..OverlayPlacement::default()
    }
}

const CANVAS: PixelSize = PixelSize {
    width: 1000,
    height: 2000,
};
const MARK: PixelSize = PixelSize {
    width: 100,
    height: 50,
};

#[test]
fn bottom_right_absolute_margin() {
    let p = placement(Anchor::BottomRight, 10.0, LengthUnit::Absolute);
    assert_eq!(p.resolve(CANVAS, MARK), OverlayPosition { x: 890, y: 10 });
}

#[test]
fn bottom_right_percent_margin_uses_each_axis() {
    let p = placement(Anchor::BottomRight, 0.05, LengthUnit::Percent);
    assert_eq!(p.resolve(CANVAS, MARK), OverlayPosition { x: 850, y: 100 });
}

#[test]
fn remaining_anchors() {
    let at = |anchor| placement(anchor, 10.0, LengthUnit::Absolute).resolve(CANVAS, MARK);
    assert_eq!(at(Anchor::TopLeft), OverlayPosition { x: 10, y: 1940 });
    assert_eq!(at(Anchor::TopRight), OverlayPosition { x: 890, y: 1940 });
    assert_eq!(at(Anchor::BottomLeft), OverlayPosition { x: 10, y: 10 });
    assert_eq!(at(Anchor::Center), OverlayPosition { x: 450, y: 975 });
}

#[test]
fn offsets_are_added_and_floored() {
    let p = OverlayPlacement {
        anchor: Anchor::BottomLeft,
        offset_x: 0.0105,
        offset_y: -0.0013,
        offset_unit: LengthUnit::Percent,
        ..OverlayPlacement::default()
    };
    // 10.5 -> 10, -2.6 -> -3
    assert_eq!(p.resolve(CANVAS, MARK), OverlayPosition { x: 10, y: -3 });
}

#[test]
fn raster_origin_flips_to_y_down() {
    let pos = OverlayPosition { x: 890, y: 10 };
    assert_eq!(pos.raster_origin(CANVAS, MARK), (890, 1940));
}

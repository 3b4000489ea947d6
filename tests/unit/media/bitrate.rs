use super::*;

#[test]
fn video_estimate_uses_bits_per_pixel() {
    // 0.08 * 1920 * 1080 * 30
    assert_eq!(
        estimate_video_bitrate(PixelSize::new(1920, 1080), Fps::new(30, 1).unwrap()),
        4_976_640
    );
}

#[test]
fn video_estimate_raises_low_frame_rates_to_24() {
    let low = estimate_video_bitrate(PixelSize::new(1280, 720), Fps::new(10, 1).unwrap());
    let at_24 = estimate_video_bitrate(PixelSize::new(1280, 720), Fps::new(24, 1).unwrap());
    assert_eq!(low, at_24);
    assert_eq!(at_24, 1_769_472);
}

#[test]
fn video_estimate_has_a_floor() {
    assert_eq!(
        estimate_video_bitrate(PixelSize::new(64, 64), Fps::new(30, 1).unwrap()),
        500_000
    );
}

#[test]
fn audio_estimate_is_clamped() {
    assert_eq!(estimate_audio_bitrate(8_000, 1), 96_000);
    assert_eq!(estimate_audio_bitrate(44_100, 2), 176_400);
    assert_eq!(estimate_audio_bitrate(96_000, 6), 320_000);
}

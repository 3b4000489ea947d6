use crate::foundation::core::{Fps, PixelSize};

const VIDEO_BITS_PER_PIXEL: f64 = 0.08;
const VIDEO_MIN_FPS: f64 = 24.0;
const VIDEO_MIN_BITRATE: u64 = 500_000;

const AUDIO_MIN_BITRATE: u64 = 96_000;
const AUDIO_MAX_BITRATE: u64 = 320_000;

/// Video bitrate estimate in bits per second.
///
/// `0.08 × width × height × max(24, fps)`, never below 500 kbps.
pub fn estimate_video_bitrate(size: PixelSize, frame_rate: Fps) -> u64 {
    let fps = frame_rate.as_f64().max(VIDEO_MIN_FPS);
    let bits = VIDEO_BITS_PER_PIXEL * f64::from(size.width) * f64::from(size.height) * fps;
    (bits.round() as u64).max(VIDEO_MIN_BITRATE)
}

/// Audio bitrate estimate in bits per second, `sample_rate × channels × 2` clamped to
/// 96..=320 kbps.
pub fn estimate_audio_bitrate(sample_rate: u32, channels: u16) -> u64 {
    (u64::from(sample_rate) * u64::from(channels) * 2).clamp(AUDIO_MIN_BITRATE, AUDIO_MAX_BITRATE)
}

#[cfg(test)]
#[path = "../../tests/unit/media/bitrate.rs"]
mod tests;

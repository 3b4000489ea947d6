use crate::foundation::core::{Affine, Fps, PixelSize, Size};

/// Read-only description of the input video track.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct VideoTrackDescriptor {
    /// Pixel dimensions from the stream's format description, when known.
    pub pixel_size: Option<PixelSize>,
    /// Container-level presentation size. May be stale; only used as a fallback.
    pub natural_size: Size,
    /// Nominal frame rate.
    pub frame_rate: Fps,
    /// Stored orientation transform, expressed in y-up container coordinates.
    pub orientation: Affine,
    /// Decoder pixel format name (for example `yuv420p`).
    pub pixel_format: String,
}

/// Read-only description of the input audio track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AudioTrackDescriptor {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioTrackDescriptor {
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Build a descriptor, defaulting undeterminable values to 44.1kHz stereo.
    pub fn from_probe(sample_rate: Option<u32>, channels: Option<u16>) -> Self {
        Self {
            sample_rate: sample_rate
                .filter(|r| *r > 0)
                .unwrap_or(Self::DEFAULT_SAMPLE_RATE),
            channels: channels
                .filter(|c| *c > 0)
                .unwrap_or(Self::DEFAULT_CHANNELS),
        }
    }
}

/// One decoded video frame: straight RGBA8 at raw pixel size.
#[derive(Clone, Debug)]
pub struct VideoSample {
    /// Presentation timestamp in seconds from stream start.
    pub pts_secs: f64,
    pub size: PixelSize,
    pub rgba: Vec<u8>,
}

/// One chunk of decoded interleaved `s16` PCM.
#[derive(Clone, Debug)]
pub struct AudioSample {
    /// Presentation timestamp in seconds from stream start.
    pub pts_secs: f64,
    pub channels: u16,
    pub pcm: Vec<i16>,
}

impl AudioSample {
    /// Number of sample frames (samples per channel) in this chunk.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.pcm.len() / self.channels as usize
        }
    }
}

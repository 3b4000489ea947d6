use std::path::Path;

use crate::foundation::core::{Fps, PixelSize};
use crate::foundation::error::VidmarkResult;
use crate::media::track::{AudioSample, AudioTrackDescriptor, VideoSample, VideoTrackDescriptor};
use crate::render::buffer_pool::PixelBuffer;
use crate::request::model::VideoCodec;

/// Opens readers and writers for container files.
pub trait MediaBackend: Send + Sync {
    fn open_reader(&self, path: &Path) -> VidmarkResult<Box<dyn MediaReader>>;
    fn create_writer(&self, path: &Path) -> VidmarkResult<Box<dyn MediaWriter>>;
}

/// Decoded video output requested from a reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoDecodeConfig {
    /// Raw (unrotated) frame size; samples are straight RGBA8 at this size.
    pub size: PixelSize,
}

/// Decoded audio output requested from a reader: interleaved `s16` PCM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioDecodeConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample frames per pulled chunk.
    pub chunk_frames: usize,
}

/// Demuxes and decodes one input container.
///
/// Output must be configured for every track that will be pulled, before the first pull.
pub trait MediaReader: Send {
    fn video_track(&self) -> &VideoTrackDescriptor;
    fn audio_track(&self) -> Option<&AudioTrackDescriptor>;
    /// Container duration in seconds, `0.0` when unknown.
    fn duration_secs(&self) -> f64;

    fn configure_video_output(&mut self, cfg: &VideoDecodeConfig) -> VidmarkResult<()>;
    fn configure_audio_output(&mut self, cfg: &AudioDecodeConfig) -> VidmarkResult<()>;

    /// Next decoded video frame, `None` once the track is exhausted.
    fn next_video_sample(&mut self) -> VidmarkResult<Option<VideoSample>>;
    /// Next decoded audio chunk, `None` once the track is exhausted.
    fn next_audio_sample(&mut self) -> VidmarkResult<Option<AudioSample>>;

    /// Stop decoding and release decoder resources. Idempotent.
    fn cancel_reading(&mut self);
}

/// Audio codec used for every re-encoded audio track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Aac,
}

impl AudioCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aac => "aac",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoOutputConfig {
    pub codec: VideoCodec,
    pub size: PixelSize,
    pub frame_rate: Fps,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioOutputConfig {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
}

/// Encodes and muxes one output container.
///
/// Call order: `add_*_track` (negotiation), `begin_session`, appends interleaved with readiness
/// checks, `finish_*_input`, then either `finish` or `cancel_writing`.
pub trait MediaWriter: Send {
    /// Negotiate and add the video track. Rejection is a negotiation error.
    fn add_video_track(&mut self, cfg: &VideoOutputConfig) -> VidmarkResult<()>;
    /// Negotiate and add the audio track. Rejection is a negotiation error.
    fn add_audio_track(&mut self, cfg: &AudioOutputConfig) -> VidmarkResult<()>;

    fn begin_session(&mut self, start_secs: f64) -> VidmarkResult<()>;

    /// Whether the video input can take another frame right now.
    fn video_ready(&mut self) -> bool;
    /// Whether the audio input can take another chunk right now.
    fn audio_ready(&mut self) -> bool;

    fn append_video(&mut self, frame: &PixelBuffer, pts_secs: f64) -> VidmarkResult<()>;
    fn append_audio(&mut self, sample: &AudioSample) -> VidmarkResult<()>;

    /// Mark the video input complete. Called at most once per writer.
    fn finish_video_input(&mut self) -> VidmarkResult<()>;
    /// Mark the audio input complete. Called at most once per writer, also when no audio track
    /// was added.
    fn finish_audio_input(&mut self) -> VidmarkResult<()>;

    /// Finish both inputs without finalizing and discard intermediate state. Idempotent.
    fn cancel_writing(&mut self);

    /// Finalize the container.
    fn finish(self: Box<Self>) -> VidmarkResult<()>;
}

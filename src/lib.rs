//! Vidmark burns a watermark (image or rendered text) into a video.
//!
//! A job decodes the input's video and audio tracks, maps every frame into the display-oriented
//! render space, composites one precomputed overlay on top, and re-encodes both tracks into a new
//! container:
//!
//! - Describe the job with a [`ComposeRequest`]
//! - Start it on a [`TaskManager`] backed by a [`MediaBackend`] ([`FfmpegBackend`] or
//!   [`MemoryBackend`])
//! - Observe progress and the terminal outcome through the returned [`TaskTicket`]
#![forbid(unsafe_code)]

mod assets;
mod foundation;
mod geometry;
mod media;
mod overlay;
mod pipeline;
mod render;
mod request;
mod task;

pub use crate::foundation::core::{Affine, Fps, PixelSize, Point, Rect, Size, Vec2};
pub use crate::foundation::error::{ErrorCode, VidmarkError, VidmarkResult};

pub use crate::assets::text::{SvgTextRasterizer, TextRasterizer};
pub use crate::geometry::orientation::{normalize_quarter_turns, orientation_for_rotation};
pub use crate::geometry::resolve::{RenderGeometry, resolve_render_geometry};
pub use crate::media::backend::{
    AudioCodec, AudioDecodeConfig, AudioOutputConfig, MediaBackend, MediaReader, MediaWriter,
    VideoDecodeConfig, VideoOutputConfig,
};
pub use crate::media::bitrate::{estimate_audio_bitrate, estimate_video_bitrate};
pub use crate::media::ffmpeg::{FfmpegBackend, ensure_parent_dir, is_ffmpeg_on_path};
pub use crate::media::memory::{
    MemoryBackend, MemoryFaults, MemoryOutputSummary, MemoryRecording, MemorySource,
};
pub use crate::media::probe::{MediaProbe, probe_tracks};
pub use crate::media::track::{
    AudioSample, AudioTrackDescriptor, VideoSample, VideoTrackDescriptor,
};
pub use crate::overlay::build::{OverlayImage, build_overlay};
pub use crate::overlay::placement::OverlayPosition;
pub use crate::pipeline::compose::{
    ComposeJob, ComposeSummary, PipelineOpts, PipelineOutcome, PipelineState, run_compose,
};
pub use crate::pipeline::progress::Progress;
pub use crate::render::buffer_pool::{
    PixelBuffer, PixelBufferPool, PixelBufferPoolOpts, PixelBufferPoolStats,
};
pub use crate::render::composite::{PremulRgba8, composite_overlay, over};
pub use crate::request::model::{
    Anchor, ComposeRequest, LengthUnit, OverlayPlacement, TextStyle, VideoCodec, WatermarkSource,
};
pub use crate::task::manager::{TaskCallbacks, TaskManager, TaskOutcome, TaskTicket};

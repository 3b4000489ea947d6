use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::{Affine, Fps, PixelSize, Size};
use crate::foundation::error::{VidmarkError, VidmarkResult};
use crate::media::backend::{
    AudioDecodeConfig, AudioOutputConfig, MediaBackend, MediaReader, MediaWriter,
    VideoDecodeConfig, VideoOutputConfig,
};
use crate::media::track::{AudioSample, AudioTrackDescriptor, VideoSample, VideoTrackDescriptor};
use crate::render::buffer_pool::PixelBuffer;

/// Synthetic input served by [`MemoryBackend`] for every path.
#[derive(Clone, Debug)]
pub struct MemorySource {
    /// `None` simulates a container without a video track.
    pub video: Option<VideoTrackDescriptor>,
    pub video_frames: u64,
    pub audio: Option<AudioTrackDescriptor>,
    /// Total audio sample frames (samples per channel).
    pub audio_frames: u64,
    pub duration_secs: f64,
    /// Sleep before each decoded video frame.
    pub frame_delay: Option<Duration>,
}

impl MemorySource {
    /// Unrotated `width`x`height` video at `fps` with `frames` frames and no audio.
    pub fn video_only(width: u32, height: u32, fps: u32, frames: u64) -> Self {
        let frame_rate = Fps { num: fps.max(1), den: 1 };
        Self {
            video: Some(VideoTrackDescriptor {
                pixel_size: Some(PixelSize::new(width, height)),
                natural_size: Size::new(f64::from(width), f64::from(height)),
                frame_rate,
                orientation: Affine::IDENTITY,
                pixel_format: "rgba".to_string(),
            }),
            video_frames: frames,
            audio: None,
            audio_frames: 0,
            duration_secs: frame_rate.frames_to_secs(frames),
            frame_delay: None,
        }
    }

    /// Add an audio track carrying `seconds` of audio; extends the duration when longer.
    pub fn with_audio(mut self, sample_rate: u32, channels: u16, seconds: f64) -> Self {
        self.audio = Some(AudioTrackDescriptor {
            sample_rate,
            channels,
        });
        self.audio_frames = (seconds * f64::from(sample_rate)).round() as u64;
        self.duration_secs = self.duration_secs.max(seconds);
        self
    }

    pub fn with_orientation(mut self, orientation: Affine) -> Self {
        if let Some(v) = self.video.as_mut() {
            v.orientation = orientation;
        }
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }
}

/// Failures the in-memory backend can be told to produce.
#[derive(Clone, Debug, Default)]
pub struct MemoryFaults {
    pub reject_video_decode: bool,
    pub reject_video_track: bool,
    pub reject_audio_track: bool,
    /// Fail the video append with this zero-based index.
    pub fail_video_append_at: Option<u64>,
    /// Fail the audio append with this zero-based index.
    pub fail_audio_append_at: Option<u64>,
    pub fail_finish: bool,
    /// Report the video input as not ready on every n-th readiness check.
    pub video_not_ready_every: Option<u32>,
    /// Refuse audio until the video input is finished.
    pub audio_waits_for_video: bool,
}

/// Everything the in-memory writer and reader observed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryRecording {
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub video_config: Option<VideoOutputConfig>,
    pub audio_config: Option<AudioOutputConfig>,
    pub session_start: Option<f64>,
    pub video_pts: Vec<f64>,
    pub first_frame: Option<Vec<u8>>,
    pub audio_chunks: u64,
    pub audio_frames: u64,
    pub audio_frames_read: u64,
    pub not_ready_polls: u64,
    pub video_input_finished: bool,
    pub audio_input_finished: bool,
    pub video_finish_calls: u32,
    pub audio_finish_calls: u32,
    pub reader_cancelled: bool,
    pub writer_cancelled: bool,
    pub finished: bool,
}

/// Summary written to the output path when the in-memory writer finishes.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct MemoryOutputSummary {
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub video_frames: u64,
    pub audio_frames: u64,
}

/// Backend that decodes synthetic media and records writes instead of encoding.
///
/// Synthetic frames encode their coordinates and index: pixel `(x, y)` of frame `i` is
/// `[x, y, i, 255]` (each component truncated to `u8`).
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    source: MemorySource,
    faults: MemoryFaults,
    recording: Arc<Mutex<MemoryRecording>>,
}

impl MemoryBackend {
    pub fn new(source: MemorySource) -> Self {
        Self {
            source,
            faults: MemoryFaults::default(),
            recording: Arc::new(Mutex::new(MemoryRecording::default())),
        }
    }

    pub fn with_faults(mut self, faults: MemoryFaults) -> Self {
        self.faults = faults;
        self
    }

    /// Snapshot of what has been recorded so far.
    pub fn recording(&self) -> MemoryRecording {
        lock(&self.recording).clone()
    }
}

fn lock(m: &Mutex<MemoryRecording>) -> MutexGuard<'_, MemoryRecording> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MediaBackend for MemoryBackend {
    fn open_reader(&self, path: &Path) -> VidmarkResult<Box<dyn MediaReader>> {
        let Some(video) = self.source.video.clone() else {
            return Err(VidmarkError::input(format!(
                "'{}' has no video track",
                path.display()
            )));
        };
        lock(&self.recording).input_path = Some(path.to_path_buf());
        Ok(Box::new(MemoryReader {
            source: self.source.clone(),
            video,
            faults: self.faults.clone(),
            recording: Arc::clone(&self.recording),
            video_cfg: None,
            audio_cfg: None,
            next_frame: 0,
            audio_frames_read: 0,
            cancelled: false,
        }))
    }

    fn create_writer(&self, path: &Path) -> VidmarkResult<Box<dyn MediaWriter>> {
        std::fs::File::create(path)
            .with_context(|| format!("failed to create output file '{}'", path.display()))?;
        lock(&self.recording).output_path = Some(path.to_path_buf());
        Ok(Box::new(MemoryWriter {
            path: path.to_path_buf(),
            faults: self.faults.clone(),
            recording: Arc::clone(&self.recording),
            video_cfg: None,
            audio_cfg: None,
            ready_polls: 0,
            video_finished: false,
            video_appends: 0,
            audio_appends: 0,
        }))
    }
}

struct MemoryReader {
    source: MemorySource,
    video: VideoTrackDescriptor,
    faults: MemoryFaults,
    recording: Arc<Mutex<MemoryRecording>>,
    video_cfg: Option<VideoDecodeConfig>,
    audio_cfg: Option<AudioDecodeConfig>,
    next_frame: u64,
    audio_frames_read: u64,
    cancelled: bool,
}

impl MediaReader for MemoryReader {
    fn video_track(&self) -> &VideoTrackDescriptor {
        &self.video
    }

    fn audio_track(&self) -> Option<&AudioTrackDescriptor> {
        self.source.audio.as_ref()
    }

    fn duration_secs(&self) -> f64 {
        self.source.duration_secs
    }

    fn configure_video_output(&mut self, cfg: &VideoDecodeConfig) -> VidmarkResult<()> {
        if self.faults.reject_video_decode {
            return Err(VidmarkError::negotiation(
                "memory reader rejected the video output configuration",
            ));
        }
        self.video_cfg = Some(*cfg);
        Ok(())
    }

    fn configure_audio_output(&mut self, cfg: &AudioDecodeConfig) -> VidmarkResult<()> {
        if self.source.audio.is_none() {
            return Err(VidmarkError::negotiation("input has no audio track"));
        }
        if cfg.chunk_frames == 0 || cfg.channels == 0 {
            return Err(VidmarkError::negotiation(
                "audio output needs non-zero chunk size and channels",
            ));
        }
        self.audio_cfg = Some(*cfg);
        Ok(())
    }

    fn next_video_sample(&mut self) -> VidmarkResult<Option<VideoSample>> {
        if self.cancelled || self.next_frame >= self.source.video_frames {
            return Ok(None);
        }
        let cfg = self
            .video_cfg
            .ok_or_else(|| VidmarkError::input("video output was not configured"))?;
        if let Some(delay) = self.source.frame_delay {
            std::thread::sleep(delay);
        }

        let index = self.next_frame;
        self.next_frame += 1;
        let (w, h) = (cfg.size.width, cfg.size.height);
        let mut rgba = Vec::with_capacity(cfg.size.rgba_len());
        for y in 0..h {
            for x in 0..w {
                rgba.extend_from_slice(&[x as u8, y as u8, index as u8, 255]);
            }
        }
        Ok(Some(VideoSample {
            pts_secs: self.video.frame_rate.frames_to_secs(index),
            size: cfg.size,
            rgba,
        }))
    }

    fn next_audio_sample(&mut self) -> VidmarkResult<Option<AudioSample>> {
        if self.cancelled || self.audio_frames_read >= self.source.audio_frames {
            return Ok(None);
        }
        let cfg = self
            .audio_cfg
            .ok_or_else(|| VidmarkError::input("audio output was not configured"))?;

        let frames = (self.source.audio_frames - self.audio_frames_read).min(cfg.chunk_frames as u64);
        let start = self.audio_frames_read;
        let mut pcm = Vec::with_capacity(frames as usize * usize::from(cfg.channels));
        for f in start..start + frames {
            let v = (f % 1000) as i16;
            pcm.extend(std::iter::repeat_n(v, usize::from(cfg.channels)));
        }
        self.audio_frames_read += frames;
        lock(&self.recording).audio_frames_read = self.audio_frames_read;

        Ok(Some(AudioSample {
            pts_secs: start as f64 / f64::from(cfg.sample_rate),
            channels: cfg.channels,
            pcm,
        }))
    }

    fn cancel_reading(&mut self) {
        self.cancelled = true;
        lock(&self.recording).reader_cancelled = true;
    }
}

struct MemoryWriter {
    path: PathBuf,
    faults: MemoryFaults,
    recording: Arc<Mutex<MemoryRecording>>,
    video_cfg: Option<VideoOutputConfig>,
    audio_cfg: Option<AudioOutputConfig>,
    ready_polls: u64,
    video_finished: bool,
    video_appends: u64,
    audio_appends: u64,
}

impl MediaWriter for MemoryWriter {
    fn add_video_track(&mut self, cfg: &VideoOutputConfig) -> VidmarkResult<()> {
        if self.faults.reject_video_track {
            return Err(VidmarkError::negotiation(format!(
                "memory writer rejected {} video track",
                cfg.codec
            )));
        }
        self.video_cfg = Some(*cfg);
        lock(&self.recording).video_config = Some(*cfg);
        Ok(())
    }

    fn add_audio_track(&mut self, cfg: &AudioOutputConfig) -> VidmarkResult<()> {
        if self.faults.reject_audio_track {
            return Err(VidmarkError::negotiation(
                "memory writer rejected the audio track",
            ));
        }
        self.audio_cfg = Some(*cfg);
        lock(&self.recording).audio_config = Some(*cfg);
        Ok(())
    }

    fn begin_session(&mut self, start_secs: f64) -> VidmarkResult<()> {
        lock(&self.recording).session_start = Some(start_secs);
        Ok(())
    }

    fn video_ready(&mut self) -> bool {
        let Some(every) = self.faults.video_not_ready_every.filter(|n| *n > 0) else {
            return true;
        };
        self.ready_polls += 1;
        if self.ready_polls.is_multiple_of(u64::from(every)) {
            lock(&self.recording).not_ready_polls += 1;
            return false;
        }
        true
    }

    fn audio_ready(&mut self) -> bool {
        self.audio_cfg.is_some() && (self.video_finished || !self.faults.audio_waits_for_video)
    }

    fn append_video(&mut self, frame: &PixelBuffer, pts_secs: f64) -> VidmarkResult<()> {
        let index = self.video_appends;
        self.video_appends += 1;
        if self.faults.fail_video_append_at == Some(index) {
            return Err(VidmarkError::encode(format!(
                "injected video append failure at frame {index}"
            )));
        }
        let mut rec = lock(&self.recording);
        if rec.first_frame.is_none() {
            rec.first_frame = Some(frame.data().to_vec());
        }
        rec.video_pts.push(pts_secs);
        Ok(())
    }

    fn append_audio(&mut self, sample: &AudioSample) -> VidmarkResult<()> {
        let index = self.audio_appends;
        self.audio_appends += 1;
        if self.faults.fail_audio_append_at == Some(index) {
            return Err(VidmarkError::encode(format!(
                "injected audio append failure at chunk {index}"
            )));
        }
        let mut rec = lock(&self.recording);
        rec.audio_chunks += 1;
        rec.audio_frames += sample.frames() as u64;
        Ok(())
    }

    fn finish_video_input(&mut self) -> VidmarkResult<()> {
        self.video_finished = true;
        let mut rec = lock(&self.recording);
        rec.video_input_finished = true;
        rec.video_finish_calls += 1;
        Ok(())
    }

    fn finish_audio_input(&mut self) -> VidmarkResult<()> {
        let mut rec = lock(&self.recording);
        rec.audio_input_finished = true;
        rec.audio_finish_calls += 1;
        Ok(())
    }

    fn cancel_writing(&mut self) {
        let mut rec = lock(&self.recording);
        rec.video_input_finished = true;
        rec.audio_input_finished = true;
        rec.writer_cancelled = true;
    }

    fn finish(self: Box<Self>) -> VidmarkResult<()> {
        if self.faults.fail_finish {
            return Err(VidmarkError::encode("injected finalize failure"));
        }
        let cfg = self
            .video_cfg
            .ok_or_else(|| VidmarkError::encode("no video track was added"))?;

        let summary = {
            let mut rec = lock(&self.recording);
            rec.finished = true;
            MemoryOutputSummary {
                width: cfg.size.width,
                height: cfg.size.height,
                codec: cfg.codec.to_string(),
                video_frames: rec.video_pts.len() as u64,
                audio_frames: rec.audio_frames,
            }
        };
        let json = serde_json::to_vec_pretty(&summary)
            .map_err(|e| VidmarkError::encode(format!("failed to serialize summary: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            VidmarkError::encode(format!(
                "failed to write output '{}': {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/memory.rs"]
mod tests;

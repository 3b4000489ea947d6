use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::assets::text::TextRasterizer;
use crate::foundation::error::{VidmarkError, VidmarkResult};
use crate::geometry::resolve::{RenderGeometry, resolve_render_geometry};
use crate::media::backend::{
    AudioCodec, AudioDecodeConfig, AudioOutputConfig, MediaBackend, MediaReader, MediaWriter,
    VideoDecodeConfig, VideoOutputConfig,
};
use crate::media::bitrate::{estimate_audio_bitrate, estimate_video_bitrate};
use crate::media::track::VideoSample;
use crate::overlay::build::{OverlayImage, build_overlay};
use crate::pipeline::progress::{Progress, ProgressTracker};
use crate::render::buffer_pool::{PixelBufferPool, PixelBufferPoolOpts};
use crate::render::composite::composite_overlay;
use crate::render::warp::warp_into;
use crate::request::model::{ComposeRequest, VideoCodec};

/// Upper bound on audio chunks moved between two cancellation checks.
pub(crate) const AUDIO_CHUNKS_PER_TICK: usize = 8;

/// Tuning knobs for one pipeline run.
#[derive(Clone, Copy, Debug)]
pub struct PipelineOpts {
    /// Sleep when an encoder input is temporarily not ready.
    pub backoff: Duration,
    pub pool: PixelBufferPoolOpts,
    /// Sample frames per decoded audio chunk.
    pub audio_chunk_frames: usize,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(5),
            pool: PixelBufferPoolOpts::default(),
            audio_chunk_frames: 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Initializing,
    Running,
    DrainingAudioTail,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

/// Result details of a completed job.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ComposeSummary {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_ms: u64,
    pub codec: VideoCodec,
    pub video_frames: u64,
    /// Audio sample frames appended (samples per channel).
    pub audio_samples: u64,
}

/// Terminal result of a pipeline run.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(ComposeSummary),
    Cancelled,
    Failed(VidmarkError),
}

/// Everything one pipeline run borrows from its caller.
pub struct ComposeJob<'a> {
    pub request: &'a ComposeRequest,
    pub output_path: &'a Path,
    pub backend: &'a dyn MediaBackend,
    pub rasterizer: &'a dyn TextRasterizer,
    pub opts: PipelineOpts,
    pub cancel: &'a AtomicBool,
}

enum Interrupt {
    Cancelled,
    Failed(VidmarkError),
}

impl From<VidmarkError> for Interrupt {
    fn from(e: VidmarkError) -> Self {
        Self::Failed(e)
    }
}

type Step<T> = Result<T, Interrupt>;

/// Run one compositing transcode to completion, cancellation, or failure.
///
/// Partial output is removed before this returns on every non-completed path.
#[tracing::instrument(skip_all, fields(input = %job.request.input_path.display(), output = %job.output_path.display()))]
pub fn run_compose(job: ComposeJob<'_>, on_progress: &mut dyn FnMut(Progress)) -> PipelineOutcome {
    let mut pipeline = Pipeline {
        job,
        state: PipelineState::Initializing,
        reader: None,
        writer: None,
        pool: None,
        output_created: false,
        video_input_finished: false,
        audio_input_finished: false,
        video_frames: 0,
        audio_samples: 0,
        last_video_pts: 0.0,
    };

    match pipeline.execute(on_progress) {
        Ok(summary) => {
            pipeline.transition(PipelineState::Completed);
            PipelineOutcome::Completed(summary)
        }
        Err(Interrupt::Cancelled) => {
            pipeline.abort();
            pipeline.transition(PipelineState::Cancelled);
            PipelineOutcome::Cancelled
        }
        Err(Interrupt::Failed(e)) => {
            tracing::warn!(state = ?pipeline.state, error = %e, "compose failed");
            pipeline.abort();
            pipeline.transition(PipelineState::Failed);
            PipelineOutcome::Failed(e)
        }
    }
}

struct Pipeline<'a> {
    job: ComposeJob<'a>,
    state: PipelineState,
    reader: Option<Box<dyn MediaReader>>,
    writer: Option<Box<dyn MediaWriter>>,
    pool: Option<PixelBufferPool>,
    output_created: bool,
    video_input_finished: bool,
    audio_input_finished: bool,
    video_frames: u64,
    audio_samples: u64,
    last_video_pts: f64,
}

/// Per-job values fixed during setup.
struct Plan {
    geometry: RenderGeometry,
    overlay: Option<OverlayImage>,
    has_audio: bool,
    duration_secs: f64,
}

impl Pipeline<'_> {
    fn transition(&mut self, next: PipelineState) {
        tracing::debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    fn check_cancelled(&self) -> Step<()> {
        if self.job.cancel.load(Ordering::Acquire) {
            return Err(Interrupt::Cancelled);
        }
        Ok(())
    }

    fn reader(&mut self) -> VidmarkResult<&mut Box<dyn MediaReader>> {
        self.reader
            .as_mut()
            .ok_or_else(|| VidmarkError::input("reader is not open"))
    }

    fn writer(&mut self) -> VidmarkResult<&mut Box<dyn MediaWriter>> {
        self.writer
            .as_mut()
            .ok_or_else(|| VidmarkError::encode("writer is not open"))
    }

    fn execute(&mut self, on_progress: &mut dyn FnMut(Progress)) -> Step<ComposeSummary> {
        let plan = self.setup()?;
        let mut progress = ProgressTracker::new(plan.duration_secs);

        self.transition(PipelineState::Running);
        let mut video_done = false;
        let mut audio_done = !plan.has_audio;
        while !video_done {
            self.check_cancelled()?;

            if self.writer()?.video_ready() {
                match self.reader()?.next_video_sample()? {
                    Some(sample) => {
                        let pts = sample.pts_secs;
                        self.process_frame(&plan, sample)?;
                        on_progress(progress.observe(pts));
                    }
                    None => {
                        video_done = true;
                        self.finish_video_input()?;
                    }
                }
            } else {
                std::thread::sleep(self.job.opts.backoff);
            }

            self.pump_audio(&mut audio_done)?;
        }

        self.transition(PipelineState::DrainingAudioTail);
        while !audio_done {
            self.check_cancelled()?;
            if !self.pump_audio(&mut audio_done)? && !audio_done {
                std::thread::sleep(self.job.opts.backoff);
            }
        }

        self.transition(PipelineState::Finalizing);
        self.finalize(&plan)
    }

    fn setup(&mut self) -> Step<Plan> {
        let request = self.job.request;
        request.validate()?;
        let mut reader = self.job.backend.open_reader(&request.input_path)?;

        let geometry = resolve_render_geometry(reader.video_track())?;
        let frame_rate = reader.video_track().frame_rate;
        let overlay = build_overlay(request, geometry.render_size, self.job.rasterizer)?;

        reader.configure_video_output(&VideoDecodeConfig {
            size: geometry.source_size,
        })?;
        let audio_track = reader.audio_track().copied();
        if let Some(audio) = audio_track {
            reader.configure_audio_output(&AudioDecodeConfig {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                chunk_frames: self.job.opts.audio_chunk_frames,
            })?;
        }
        let duration_secs = reader.duration_secs();
        self.reader = Some(reader);

        let mut writer = self.job.backend.create_writer(self.job.output_path)?;
        self.output_created = true;

        let video_cfg = VideoOutputConfig {
            codec: request.codec,
            size: geometry.render_size,
            frame_rate,
            bitrate: request
                .bitrate
                .unwrap_or_else(|| estimate_video_bitrate(geometry.render_size, frame_rate)),
        };
        let added = writer.add_video_track(&video_cfg).and_then(|()| match audio_track {
            Some(audio) => writer.add_audio_track(&AudioOutputConfig {
                codec: AudioCodec::Aac,
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                bitrate: estimate_audio_bitrate(audio.sample_rate, audio.channels),
            }),
            None => Ok(()),
        });
        self.writer = Some(writer);
        added?;
        self.writer()?.begin_session(0.0)?;

        self.pool = Some(PixelBufferPool::new(
            geometry.render_size,
            self.job.opts.pool,
        )?);

        tracing::info!(
            width = geometry.render_size.width,
            height = geometry.render_size.height,
            codec = %request.codec,
            video_bitrate = video_cfg.bitrate,
            audio = audio_track.is_some(),
            overlay = overlay.is_some(),
            "compose pipeline ready"
        );

        Ok(Plan {
            geometry,
            overlay,
            has_audio: audio_track.is_some(),
            duration_secs,
        })
    }

    fn process_frame(&mut self, plan: &Plan, sample: VideoSample) -> Step<()> {
        let pool = self
            .pool
            .as_mut()
            .ok_or_else(|| VidmarkError::resource("pixel buffer pool is not open"))?;
        let mut buffer = pool.acquire()?;

        let rendered = warp_into(
            &sample.rgba,
            sample.size,
            plan.geometry.render_transform,
            buffer.data_mut(),
            plan.geometry.render_size,
        )
        .and_then(|()| {
            if let Some(overlay) = plan.overlay.as_ref() {
                composite_overlay(&mut buffer, overlay);
            }
            let writer = self
                .writer
                .as_mut()
                .ok_or_else(|| VidmarkError::encode("writer is not open"))?;
            writer.append_video(&buffer, sample.pts_secs)
        });

        if let Some(pool) = self.pool.as_mut() {
            pool.release(buffer);
        }
        rendered?;

        self.video_frames += 1;
        self.last_video_pts = self.last_video_pts.max(sample.pts_secs);
        Ok(())
    }

    /// Move at most [`AUDIO_CHUNKS_PER_TICK`] audio chunks while the writer accepts them.
    /// Returns whether anything moved.
    fn pump_audio(&mut self, audio_done: &mut bool) -> Step<bool> {
        let mut moved = false;
        for _ in 0..AUDIO_CHUNKS_PER_TICK {
            if *audio_done || !self.writer()?.audio_ready() {
                break;
            }
            match self.reader()?.next_audio_sample()? {
                Some(sample) => {
                    self.writer()?.append_audio(&sample)?;
                    self.audio_samples += sample.frames() as u64;
                    moved = true;
                }
                None => {
                    *audio_done = true;
                    self.finish_audio_input()?;
                }
            }
        }
        Ok(moved)
    }

    fn finish_video_input(&mut self) -> VidmarkResult<()> {
        if !self.video_input_finished {
            self.writer()?.finish_video_input()?;
            self.video_input_finished = true;
        }
        Ok(())
    }

    fn finish_audio_input(&mut self) -> VidmarkResult<()> {
        if !self.audio_input_finished {
            self.writer()?.finish_audio_input()?;
            self.audio_input_finished = true;
        }
        Ok(())
    }

    fn finalize(&mut self, plan: &Plan) -> Step<ComposeSummary> {
        self.finish_video_input()?;
        self.finish_audio_input()?;
        if let Some(reader) = self.reader.as_mut() {
            reader.cancel_reading();
        }

        if let Some(pool) = self.pool.take() {
            let stats = pool.close()?;
            tracing::debug!(
                alloc_buffers = stats.alloc_buffers,
                reused = stats.reused,
                "pixel buffer pool closed"
            );
        }

        let writer = self
            .writer
            .take()
            .ok_or_else(|| VidmarkError::encode("writer is not open"))?;
        writer.finish()?;

        let frame_secs = self
            .reader
            .as_ref()
            .map(|r| r.video_track().frame_rate.frame_duration_secs())
            .unwrap_or(0.0);
        let duration_secs = if plan.duration_secs > 0.0 {
            plan.duration_secs
        } else if self.video_frames > 0 {
            self.last_video_pts + frame_secs
        } else {
            0.0
        };

        let summary = ComposeSummary {
            output_path: self.job.output_path.to_path_buf(),
            width: plan.geometry.render_size.width,
            height: plan.geometry.render_size.height,
            duration_ms: (duration_secs * 1000.0).round() as u64,
            codec: self.job.request.codec,
            video_frames: self.video_frames,
            audio_samples: self.audio_samples,
        };
        tracing::info!(
            frames = summary.video_frames,
            audio_samples = summary.audio_samples,
            duration_ms = summary.duration_ms,
            "compose completed"
        );
        Ok(summary)
    }

    /// Tear down after cancellation or failure and remove any partial output.
    fn abort(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            reader.cancel_reading();
        }
        if let Some(mut writer) = self.writer.take() {
            writer.cancel_writing();
        }
        if let Some(pool) = self.pool.take()
            && let Err(e) = pool.close()
        {
            tracing::warn!(error = %e, "pixel buffer pool leaked buffers");
        }
        if self.output_created {
            remove_partial_output(self.job.output_path);
        }
    }
}

fn remove_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove partial output"),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/compose.rs"]
mod tests;

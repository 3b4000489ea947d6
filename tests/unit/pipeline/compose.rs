use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::*;
use crate::assets::decode::encode_png;
use crate::foundation::core::PixelSize;
use crate::geometry::orientation::orientation_for_rotation;
use crate::media::memory::{MemoryBackend, MemoryFaults, MemorySource};
use crate::media::track::{AudioSample, AudioTrackDescriptor, VideoTrackDescriptor};
use crate::request::model::TextStyle;

struct NoText;

impl TextRasterizer for NoText {
    fn rasterize(&self, _text: &str, _style: &TextStyle) -> VidmarkResult<Vec<u8>> {
        Err(VidmarkError::overlay("text not available in tests"))
    }
}

struct Scratch(PathBuf);

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "vidmark_compose_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn out(&self) -> PathBuf {
        self.0.join("out.mp4")
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn run(
    backend: &MemoryBackend,
    request: &ComposeRequest,
    out: &Path,
    cancel: &AtomicBool,
) -> (PipelineOutcome, Vec<Progress>) {
    let mut seen = Vec::new();
    let outcome = run_compose(
        ComposeJob {
            request,
            output_path: out,
            backend,
            rasterizer: &NoText,
            opts: PipelineOpts {
                backoff: Duration::from_millis(1),
                ..PipelineOpts::default()
            },
            cancel,
        },
        &mut |p| seen.push(p),
    );
    (outcome, seen)
}

#[test]
fn completes_and_reports_render_geometry() {
    let scratch = Scratch::new("complete");
    let backend = MemoryBackend::new(MemorySource::video_only(8, 4, 10, 5));
    let request = ComposeRequest::new("in.mp4");
    let (outcome, progress) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));

    let summary = match outcome {
        PipelineOutcome::Completed(summary) => summary,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!((summary.width, summary.height), (8, 4));
    assert_eq!(summary.video_frames, 5);
    assert_eq!(summary.duration_ms, 500);
    assert_eq!(summary.codec, VideoCodec::H264);
    assert_eq!(progress.len(), 5);
    assert!(scratch.out().exists());

    let rec = backend.recording();
    assert_eq!(rec.session_start, Some(0.0));
    assert_eq!(rec.video_pts.len(), 5);
    assert!(rec.video_input_finished && rec.audio_input_finished && rec.finished);
    assert_eq!((rec.video_finish_calls, rec.audio_finish_calls), (1, 1));
    assert_eq!(rec.video_config.unwrap().bitrate, 500_000);
}

#[test]
fn rotated_track_is_written_upright() {
    let scratch = Scratch::new("rotated");
    let raw = PixelSize::new(4, 2);
    let backend = MemoryBackend::new(
        MemorySource::video_only(4, 2, 10, 1).with_orientation(orientation_for_rotation(90, raw)),
    );
    let request = ComposeRequest::new("in.mp4");
    let (outcome, _) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    assert!(matches!(outcome, PipelineOutcome::Completed(_)));

    let rec = backend.recording();
    assert_eq!(rec.video_config.unwrap().size, PixelSize::new(2, 4));
    let frame = rec.first_frame.unwrap();
    // 90 degrees clockwise: raw (x, y) lands at (H - 1 - y, x).
    let at = |x: usize, y: usize| &frame[(y * 2 + x) * 4..(y * 2 + x) * 4 + 4];
    assert_eq!(at(1, 0), &[0, 0, 0, 255]);
    assert_eq!(at(0, 0), &[0, 1, 0, 255]);
    assert_eq!(at(0, 3), &[3, 1, 0, 255]);
}

#[test]
fn watermark_is_composited_bottom_right() {
    let scratch = Scratch::new("watermark");
    let backend = MemoryBackend::new(MemorySource::video_only(10, 10, 10, 2));
    let mut request = ComposeRequest::new("in.mp4");
    request.image = Some(
        encode_png(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([200, 100, 50, 255]),
        ))
        .unwrap(),
    );
    request.width_percent = 0.2;
    let (outcome, _) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    assert!(matches!(outcome, PipelineOutcome::Completed(_)));

    let frame = backend.recording().first_frame.unwrap();
    let at = |x: usize, y: usize| &frame[(y * 10 + x) * 4..(y * 10 + x) * 4 + 4];
    assert_eq!(at(9, 9), &[200, 100, 50, 255]);
    assert_eq!(at(8, 8), &[200, 100, 50, 255]);
    assert_eq!(at(7, 9), &[7, 9, 0, 255]);
}

#[test]
fn audio_tail_longer_than_video_is_fully_written() {
    let scratch = Scratch::new("audio_tail");
    let backend =
        MemoryBackend::new(MemorySource::video_only(4, 4, 10, 3).with_audio(8_000, 2, 1.3));
    let request = ComposeRequest::new("in.mp4");
    let (outcome, progress) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));

    let summary = match outcome {
        PipelineOutcome::Completed(summary) => summary,
        other => panic!("expected completion, got {other:?}"),
    };
    let rec = backend.recording();
    assert_eq!(rec.audio_frames_read, 10_400);
    assert_eq!(rec.audio_frames, 10_400);
    assert_eq!(summary.audio_samples, 10_400);
    assert_eq!(summary.duration_ms, 1_300);
    assert_eq!(rec.audio_config.unwrap().bitrate, 96_000);
    assert!(progress.iter().all(|p| p.fraction <= 1.0));
}

#[test]
fn video_backpressure_does_not_lose_frames() {
    let scratch = Scratch::new("backpressure");
    let backend = MemoryBackend::new(MemorySource::video_only(4, 4, 30, 12)).with_faults(
        MemoryFaults {
            video_not_ready_every: Some(2),
            ..MemoryFaults::default()
        },
    );
    let request = ComposeRequest::new("in.mp4");
    let (outcome, _) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    assert!(matches!(outcome, PipelineOutcome::Completed(_)));
    let rec = backend.recording();
    assert_eq!(rec.video_pts.len(), 12);
    assert!(rec.not_ready_polls > 0);
}

#[test]
fn pre_set_cancel_removes_output() {
    let scratch = Scratch::new("cancel");
    let backend = MemoryBackend::new(MemorySource::video_only(4, 4, 30, 10));
    let request = ComposeRequest::new("in.mp4");
    let (outcome, progress) = run(&backend, &request, &scratch.out(), &AtomicBool::new(true));
    assert!(matches!(outcome, PipelineOutcome::Cancelled));
    assert!(progress.is_empty());
    assert!(!scratch.out().exists());
    let rec = backend.recording();
    assert!(rec.reader_cancelled && rec.writer_cancelled && !rec.finished);
}

#[test]
fn audio_append_failure_fails_the_whole_job() {
    let scratch = Scratch::new("audio_fail");
    let backend = MemoryBackend::new(
        MemorySource::video_only(4, 4, 10, 20).with_audio(8_000, 1, 2.0),
    )
    .with_faults(MemoryFaults {
        fail_audio_append_at: Some(2),
        ..MemoryFaults::default()
    });
    let request = ComposeRequest::new("in.mp4");
    let (outcome, _) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    let err = match outcome {
        PipelineOutcome::Failed(err) => err,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(err.code(), crate::foundation::error::ErrorCode::EncodeFailed);
    assert!(!scratch.out().exists());
}

#[test]
fn writer_negotiation_failure_happens_before_any_frame() {
    let scratch = Scratch::new("negotiate");
    let backend = MemoryBackend::new(
        MemorySource::video_only(4, 4, 10, 5).with_audio(44_100, 2, 0.5),
    )
    .with_faults(MemoryFaults {
        reject_audio_track: true,
        ..MemoryFaults::default()
    });
    let request = ComposeRequest::new("in.mp4");
    let (outcome, progress) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    let err = match outcome {
        PipelineOutcome::Failed(err) => err,
        other => panic!("expected failure, got {other:?}"),
    };
    assert!(matches!(err, VidmarkError::Negotiation(_)));
    assert!(progress.is_empty());
    assert!(backend.recording().video_pts.is_empty());
    assert!(!scratch.out().exists());
}

#[test]
fn finalize_failure_is_an_encode_error() {
    let scratch = Scratch::new("finalize");
    let backend = MemoryBackend::new(MemorySource::video_only(4, 4, 10, 2)).with_faults(
        MemoryFaults {
            fail_finish: true,
            ..MemoryFaults::default()
        },
    );
    let request = ComposeRequest::new("in.mp4");
    let (outcome, _) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    let err = match outcome {
        PipelineOutcome::Failed(err) => err,
        other => panic!("expected failure, got {other:?}"),
    };
    assert!(matches!(err, VidmarkError::Encode(_)));
    assert!(!scratch.out().exists());
}

#[test]
fn missing_video_track_is_an_input_error_and_touches_nothing() {
    let scratch = Scratch::new("no_video");
    std::fs::write(scratch.out(), b"keep").unwrap();
    let mut source = MemorySource::video_only(4, 4, 10, 2);
    source.video = None;
    let backend = MemoryBackend::new(source);
    let request = ComposeRequest::new("in.mp4");
    let (outcome, _) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    let err = match outcome {
        PipelineOutcome::Failed(err) => err,
        other => panic!("expected failure, got {other:?}"),
    };
    assert!(matches!(err, VidmarkError::Input(_)));
    assert_eq!(std::fs::read(scratch.out()).unwrap(), b"keep");
}

/// Memory backend whose reader raises the cancel flag after a number of audio pulls.
struct CancelOnAudio {
    inner: MemoryBackend,
    cancel: Arc<AtomicBool>,
    after_chunks: u64,
}

struct CancelOnAudioReader {
    inner: Box<dyn MediaReader>,
    cancel: Arc<AtomicBool>,
    after_chunks: u64,
    pulled: u64,
}

impl MediaBackend for CancelOnAudio {
    fn open_reader(&self, path: &Path) -> VidmarkResult<Box<dyn MediaReader>> {
        Ok(Box::new(CancelOnAudioReader {
            inner: self.inner.open_reader(path)?,
            cancel: Arc::clone(&self.cancel),
            after_chunks: self.after_chunks,
            pulled: 0,
        }))
    }

    fn create_writer(&self, path: &Path) -> VidmarkResult<Box<dyn MediaWriter>> {
        self.inner.create_writer(path)
    }
}

impl MediaReader for CancelOnAudioReader {
    fn video_track(&self) -> &VideoTrackDescriptor {
        self.inner.video_track()
    }

    fn audio_track(&self) -> Option<&AudioTrackDescriptor> {
        self.inner.audio_track()
    }

    fn duration_secs(&self) -> f64 {
        self.inner.duration_secs()
    }

    fn configure_video_output(&mut self, cfg: &VideoDecodeConfig) -> VidmarkResult<()> {
        self.inner.configure_video_output(cfg)
    }

    fn configure_audio_output(&mut self, cfg: &AudioDecodeConfig) -> VidmarkResult<()> {
        self.inner.configure_audio_output(cfg)
    }

    fn next_video_sample(&mut self) -> VidmarkResult<Option<VideoSample>> {
        self.inner.next_video_sample()
    }

    fn next_audio_sample(&mut self) -> VidmarkResult<Option<AudioSample>> {
        self.pulled += 1;
        if self.pulled == self.after_chunks {
            self.cancel.store(true, std::sync::atomic::Ordering::Release);
        }
        self.inner.next_audio_sample()
    }

    fn cancel_reading(&mut self) {
        self.inner.cancel_reading();
    }
}

#[test]
fn cancel_during_audio_tail_stops_within_one_batch() {
    let scratch = Scratch::new("tail_cancel");
    let memory = MemoryBackend::new(
        MemorySource::video_only(4, 4, 10, 1).with_audio(8_000, 1, 10.0),
    )
    .with_faults(MemoryFaults {
        audio_waits_for_video: true,
        ..MemoryFaults::default()
    });
    let cancel = Arc::new(AtomicBool::new(false));
    let backend = CancelOnAudio {
        inner: memory.clone(),
        cancel: Arc::clone(&cancel),
        after_chunks: 5,
    };
    let request = ComposeRequest::new("in.mp4");
    let out = scratch.out();

    let outcome = run_compose(
        ComposeJob {
            request: &request,
            output_path: &out,
            backend: &backend,
            rasterizer: &NoText,
            opts: PipelineOpts {
                backoff: Duration::from_millis(1),
                ..PipelineOpts::default()
            },
            cancel: &cancel,
        },
        &mut |_| {},
    );

    assert!(matches!(outcome, PipelineOutcome::Cancelled));
    assert!(!out.exists());
    let rec = memory.recording();
    assert_eq!(rec.video_pts.len(), 1);
    assert!(rec.audio_chunks >= 5);
    assert!(rec.audio_chunks <= AUDIO_CHUNKS_PER_TICK as u64);
    assert!(rec.writer_cancelled && !rec.finished);
}

#[test]
fn audio_is_moved_in_bounded_batches() {
    let scratch = Scratch::new("batches");
    let backend =
        MemoryBackend::new(MemorySource::video_only(4, 4, 10, 1).with_audio(8_000, 1, 4.0))
            .with_faults(MemoryFaults {
                audio_waits_for_video: true,
                ..MemoryFaults::default()
            });
    let request = ComposeRequest::new("in.mp4");
    let (outcome, _) = run(&backend, &request, &scratch.out(), &AtomicBool::new(false));
    assert!(matches!(outcome, PipelineOutcome::Completed(_)));

    let rec = backend.recording();
    assert_eq!(rec.audio_frames, 32_000);
    assert_eq!(rec.audio_chunks, 32);
    assert_eq!((rec.video_finish_calls, rec.audio_finish_calls), (1, 1));
}

use std::fs::File;
use std::io::{BufWriter, Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use anyhow::Context as _;

use crate::foundation::error::{VidmarkError, VidmarkResult};
use crate::media::backend::{
    AudioDecodeConfig, AudioOutputConfig, MediaBackend, MediaReader, MediaWriter,
    VideoDecodeConfig, VideoOutputConfig,
};
use crate::media::probe::{MediaProbe, probe_tracks};
use crate::media::track::{AudioSample, AudioTrackDescriptor, VideoSample, VideoTrackDescriptor};
use crate::render::buffer_pool::PixelBuffer;
use crate::request::model::VideoCodec;

/// How far (in seconds) spooled audio may run ahead of the last video frame.
const AUDIO_LEAD_SECS: f64 = 1.0;

/// Media backend driving the system `ffmpeg`/`ffprobe` binaries as subprocesses.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn open_reader(&self, path: &Path) -> VidmarkResult<Box<dyn MediaReader>> {
        let probe = probe_tracks(path)?;
        Ok(Box::new(FfmpegReader::new(path, probe)))
    }

    fn create_writer(&self, path: &Path) -> VidmarkResult<Box<dyn MediaWriter>> {
        if !cfg!(feature = "media-ffmpeg") {
            return Err(VidmarkError::negotiation(
                "writing media requires the 'media-ffmpeg' feature",
            ));
        }
        if !is_ffmpeg_on_path() {
            return Err(VidmarkError::negotiation(
                "ffmpeg is required for encoding, but was not found on PATH",
            ));
        }
        ensure_parent_dir(path)?;
        Ok(Box::new(FfmpegWriter::new(path)))
    }
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> VidmarkResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Whether the local `ffmpeg` build lists `name` among its encoders.
fn has_encoder(name: &str) -> bool {
    let Ok(out) = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stderr(Stdio::null())
        .output()
    else {
        return false;
    };
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

fn video_encoder_name(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "libx264",
        VideoCodec::Hevc => "libx265",
    }
}

fn temp_path(kind: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "vidmark_{kind}_{}_{}.{ext}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

struct TempFileGuard(Option<PathBuf>);

impl TempFileGuard {
    fn path(&self) -> Option<&Path> {
        self.0.as_deref()
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// A spawned `ffmpeg` with its stderr drained on a background thread.
struct FfmpegProcess {
    child: Child,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegProcess {
    fn spawn(cmd: &mut Command) -> std::io::Result<Self> {
        let mut child = cmd.stderr(Stdio::piped()).spawn()?;
        let stderr_drain = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut bytes = Vec::new();
                stderr.read_to_end(&mut bytes)?;
                Ok(bytes)
            })
        });
        Ok(Self {
            child,
            stderr_drain,
        })
    }

    /// Wait for exit and report a failure status together with the captured stderr.
    fn wait(mut self) -> Result<(), String> {
        let status = self
            .child
            .wait()
            .map_err(|e| format!("failed to wait for ffmpeg: {e}"))?;
        let stderr = self.collect_stderr();
        if status.success() {
            Ok(())
        } else {
            Err(format!("ffmpeg exited with status {status}: {}", stderr.trim()))
        }
    }

    fn kill(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = self.collect_stderr();
    }

    fn collect_stderr(&mut self) -> String {
        match self.stderr_drain.take().map(|h| h.join()) {
            Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => String::new(),
        }
    }
}

/// Fill `buf` from `src`, returning the number of bytes read before end of stream.
fn read_full(src: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

struct PipeDecoder {
    process: Option<FfmpegProcess>,
    stdout: ChildStdout,
}

impl PipeDecoder {
    fn spawn(mut cmd: Command, what: &str) -> VidmarkResult<Self> {
        cmd.stdin(Stdio::null()).stdout(Stdio::piped());
        let mut process = FfmpegProcess::spawn(&mut cmd).map_err(|e| {
            VidmarkError::input(format!(
                "failed to spawn ffmpeg {what} decoder (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdout = process
            .child
            .stdout
            .take()
            .ok_or_else(|| VidmarkError::input("failed to open ffmpeg stdout (unexpected)"))?;
        Ok(Self {
            process: Some(process),
            stdout,
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> VidmarkResult<usize> {
        read_full(&mut self.stdout, buf)
            .map_err(|e| VidmarkError::input(format!("failed to read decoded media: {e}")))
    }

    /// Reap the process after end of stream.
    fn finish(&mut self) -> VidmarkResult<()> {
        match self.process.take() {
            Some(p) => p.wait().map_err(VidmarkError::input),
            None => Ok(()),
        }
    }

    fn kill(&mut self) {
        if let Some(p) = self.process.take() {
            p.kill();
        }
    }
}

impl Drop for PipeDecoder {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Reader decoding through two `ffmpeg` child processes, one per track.
pub struct FfmpegReader {
    path: PathBuf,
    probe: MediaProbe,
    video_cfg: Option<VideoDecodeConfig>,
    audio_cfg: Option<AudioDecodeConfig>,
    video: Option<PipeDecoder>,
    audio: Option<PipeDecoder>,
    video_pts: Vec<f64>,
    video_index: u64,
    video_done: bool,
    audio_frames_read: u64,
    audio_done: bool,
    cancelled: bool,
}

impl FfmpegReader {
    fn new(path: &Path, probe: MediaProbe) -> Self {
        Self {
            path: path.to_path_buf(),
            probe,
            video_cfg: None,
            audio_cfg: None,
            video: None,
            audio: None,
            video_pts: Vec::new(),
            video_index: 0,
            video_done: false,
            audio_frames_read: 0,
            audio_done: false,
            cancelled: false,
        }
    }

    fn start_video(&mut self, cfg: VideoDecodeConfig) -> VidmarkResult<()> {
        #[cfg(feature = "media-ffmpeg")]
        {
            self.video_pts = match crate::media::probe::probe_video_pts(
                &self.path,
                self.probe.origin_secs,
            ) {
                Ok(pts) => pts,
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to nominal frame timing");
                    Vec::new()
                }
            };
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-noautorotate", "-i"])
            .arg(&self.path)
            .args([
                "-map",
                "0:v:0",
                "-an",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{}x{}", cfg.size.width, cfg.size.height),
                "pipe:1",
            ]);
        self.video = Some(PipeDecoder::spawn(cmd, "video")?);
        Ok(())
    }

    fn start_audio(&mut self, cfg: AudioDecodeConfig) -> VidmarkResult<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-i"]).arg(&self.path).args([
            "-map",
            "0:a:0",
            "-vn",
            "-f",
            "s16le",
            "-acodec",
            "pcm_s16le",
            "-ar",
            &cfg.sample_rate.to_string(),
            "-ac",
            &cfg.channels.to_string(),
            "pipe:1",
        ]);
        self.audio = Some(PipeDecoder::spawn(cmd, "audio")?);
        Ok(())
    }

    fn frame_pts(&self, index: u64) -> f64 {
        self.video_pts
            .get(index as usize)
            .copied()
            .unwrap_or_else(|| {
                self.probe.video_start_secs + self.probe.video.frame_rate.frames_to_secs(index)
            })
    }
}

impl MediaReader for FfmpegReader {
    fn video_track(&self) -> &VideoTrackDescriptor {
        &self.probe.video
    }

    fn audio_track(&self) -> Option<&AudioTrackDescriptor> {
        self.probe.audio.as_ref()
    }

    fn duration_secs(&self) -> f64 {
        self.probe.duration_secs
    }

    fn configure_video_output(&mut self, cfg: &VideoDecodeConfig) -> VidmarkResult<()> {
        if cfg.size.is_empty() {
            return Err(VidmarkError::negotiation(
                "video decode output size must be non-zero",
            ));
        }
        self.video_cfg = Some(*cfg);
        Ok(())
    }

    fn configure_audio_output(&mut self, cfg: &AudioDecodeConfig) -> VidmarkResult<()> {
        if self.probe.audio.is_none() {
            return Err(VidmarkError::negotiation("input has no audio track"));
        }
        if cfg.sample_rate == 0 || cfg.channels == 0 || cfg.chunk_frames == 0 {
            return Err(VidmarkError::negotiation(
                "audio decode output needs non-zero rate, channels and chunk size",
            ));
        }
        self.audio_cfg = Some(*cfg);
        Ok(())
    }

    fn next_video_sample(&mut self) -> VidmarkResult<Option<VideoSample>> {
        if self.cancelled || self.video_done {
            return Ok(None);
        }
        let cfg = self
            .video_cfg
            .ok_or_else(|| VidmarkError::input("video output was not configured"))?;
        if self.video.is_none() {
            self.start_video(cfg)?;
        }
        let Some(decoder) = self.video.as_mut() else {
            return Ok(None);
        };

        let mut rgba = vec![0u8; cfg.size.rgba_len()];
        let n = decoder.read(&mut rgba)?;
        if n == 0 {
            self.video_done = true;
            decoder.finish()?;
            return Ok(None);
        }
        if n < rgba.len() {
            return Err(VidmarkError::input(format!(
                "truncated video frame {}: got {n} of {} bytes",
                self.video_index,
                rgba.len()
            )));
        }

        let pts_secs = self.frame_pts(self.video_index);
        self.video_index += 1;
        Ok(Some(VideoSample {
            pts_secs,
            size: cfg.size,
            rgba,
        }))
    }

    fn next_audio_sample(&mut self) -> VidmarkResult<Option<AudioSample>> {
        if self.cancelled || self.audio_done {
            return Ok(None);
        }
        let cfg = self
            .audio_cfg
            .ok_or_else(|| VidmarkError::input("audio output was not configured"))?;
        if self.audio.is_none() {
            self.start_audio(cfg)?;
        }
        let Some(decoder) = self.audio.as_mut() else {
            return Ok(None);
        };

        let frame_bytes = usize::from(cfg.channels) * 2;
        let mut bytes = vec![0u8; cfg.chunk_frames * frame_bytes];
        let n = decoder.read(&mut bytes)?;
        let whole = n - n % frame_bytes;
        if whole == 0 {
            self.audio_done = true;
            decoder.finish()?;
            return Ok(None);
        }

        let pcm: Vec<i16> = bytes[..whole]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let pts_secs = self.probe.audio_start_secs
            + self.audio_frames_read as f64 / f64::from(cfg.sample_rate);
        self.audio_frames_read += (whole / frame_bytes) as u64;
        Ok(Some(AudioSample {
            pts_secs,
            channels: cfg.channels,
            pcm,
        }))
    }

    fn cancel_reading(&mut self) {
        self.cancelled = true;
        if let Some(mut d) = self.video.take() {
            d.kill();
        }
        if let Some(mut d) = self.audio.take() {
            d.kill();
        }
    }
}

struct VideoEncoder {
    process: FfmpegProcess,
    stdin: ChildStdin,
}

/// How a frame landing on constant frame-rate slot `slot` is written when `next_slot` is the
/// first unwritten slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotPlan {
    /// Slots to fill before the frame itself.
    pub fill: u64,
    /// Fill with the incoming frame (nothing has been written yet) instead of the previous one.
    pub fill_with_current: bool,
    /// `false` when the slot is already taken and the frame is dropped.
    pub write_current: bool,
}

pub(crate) fn plan_slots(next_slot: u64, slot: u64) -> SlotPlan {
    if slot < next_slot {
        return SlotPlan {
            fill: 0,
            fill_with_current: false,
            write_current: false,
        };
    }
    SlotPlan {
        fill: slot - next_slot,
        fill_with_current: next_slot == 0,
        write_current: true,
    }
}

/// Silent sample frames needed so a chunk stamped `pts_secs` starts at its own timestamp.
pub(crate) fn silence_frames_before(written_frames: u64, pts_secs: f64, sample_rate: u32) -> u64 {
    if !pts_secs.is_finite() || pts_secs <= 0.0 {
        return 0;
    }
    let target = (pts_secs * f64::from(sample_rate)).round() as u64;
    target.saturating_sub(written_frames)
}

fn encoder_write_error(e: &std::io::Error, detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        format!("failed to write frame to ffmpeg stdin: {e}")
    } else {
        format!("failed to write frame to ffmpeg stdin: {e}; {detail}")
    }
}

/// Writer encoding video through a piped `ffmpeg`, spooling PCM, and muxing on finish.
pub struct FfmpegWriter {
    out_path: PathBuf,
    video_cfg: Option<VideoOutputConfig>,
    audio_cfg: Option<AudioOutputConfig>,
    video_tmp: TempFileGuard,
    audio_tmp: TempFileGuard,
    encoder: Option<VideoEncoder>,
    pcm: Option<BufWriter<File>>,
    /// Next constant-frame-rate slot to write.
    next_slot: u64,
    last_frame: Vec<u8>,
    last_video_pts: f64,
    video_finished: bool,
    audio_frames_written: u64,
    audio_finished: bool,
}

impl FfmpegWriter {
    fn new(out_path: &Path) -> Self {
        Self {
            out_path: out_path.to_path_buf(),
            video_cfg: None,
            audio_cfg: None,
            video_tmp: TempFileGuard(None),
            audio_tmp: TempFileGuard(None),
            encoder: None,
            pcm: None,
            next_slot: 0,
            last_frame: Vec::new(),
            last_video_pts: 0.0,
            video_finished: false,
            audio_frames_written: 0,
            audio_finished: false,
        }
    }

    fn write_slot(&mut self, data: &[u8]) -> VidmarkResult<()> {
        let Some(enc) = self.encoder.as_mut() else {
            return Err(VidmarkError::encode("video input is already finished"));
        };
        if let Err(e) = enc.stdin.write_all(data) {
            let detail = match self.encoder.take() {
                Some(enc) => {
                    drop(enc.stdin);
                    enc.process.wait().err().unwrap_or_default()
                }
                None => String::new(),
            };
            return Err(VidmarkError::encode(encoder_write_error(&e, &detail)));
        }
        self.next_slot += 1;
        Ok(())
    }

    fn audio_end_secs(&self) -> f64 {
        match self.audio_cfg {
            Some(cfg) => self.audio_frames_written as f64 / f64::from(cfg.sample_rate),
            None => 0.0,
        }
    }

    fn mux(&self, video_cfg: &VideoOutputConfig) -> VidmarkResult<()> {
        let video_tmp = self
            .video_tmp
            .path()
            .ok_or_else(|| VidmarkError::encode("no encoded video to mux"))?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error", "-i"]).arg(video_tmp);

        let audio = match (self.audio_cfg, self.audio_tmp.path()) {
            (Some(cfg), Some(path)) if self.audio_frames_written > 0 => Some((cfg, path)),
            _ => None,
        };
        if let Some((cfg, path)) = audio {
            cmd.args([
                "-f",
                "s16le",
                "-ar",
                &cfg.sample_rate.to_string(),
                "-ac",
                &cfg.channels.to_string(),
                "-i",
            ])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
                "-c:v",
                "copy",
                "-c:a",
                cfg.codec.as_str(),
                "-b:a",
                &cfg.bitrate.to_string(),
            ]);
        } else {
            cmd.args(["-map", "0:v:0", "-c:v", "copy", "-an"]);
        }
        if video_cfg.codec == VideoCodec::Hevc {
            cmd.args(["-tag:v", "hvc1"]);
        }
        cmd.args(["-movflags", "+faststart"]).arg(&self.out_path);
        cmd.stdin(Stdio::null()).stdout(Stdio::null());

        let process = FfmpegProcess::spawn(&mut cmd)
            .map_err(|e| VidmarkError::encode(format!("failed to spawn ffmpeg mux: {e}")))?;
        process.wait().map_err(VidmarkError::encode)
    }
}

impl MediaWriter for FfmpegWriter {
    fn add_video_track(&mut self, cfg: &VideoOutputConfig) -> VidmarkResult<()> {
        if cfg.size.is_empty() {
            return Err(VidmarkError::negotiation(
                "video output size must be non-zero",
            ));
        }
        if !cfg.size.width.is_multiple_of(2) || !cfg.size.height.is_multiple_of(2) {
            return Err(VidmarkError::negotiation(format!(
                "video output {}x{} must have even width/height (yuv420p)",
                cfg.size.width, cfg.size.height
            )));
        }
        let encoder = video_encoder_name(cfg.codec);
        if !has_encoder(encoder) {
            return Err(VidmarkError::negotiation(format!(
                "ffmpeg encoder '{encoder}' for {} is not available",
                cfg.codec
            )));
        }
        self.video_cfg = Some(*cfg);
        Ok(())
    }

    fn add_audio_track(&mut self, cfg: &AudioOutputConfig) -> VidmarkResult<()> {
        if cfg.sample_rate == 0 || cfg.channels == 0 {
            return Err(VidmarkError::negotiation(
                "audio output needs a non-zero sample rate and channel count",
            ));
        }
        if !has_encoder(cfg.codec.as_str()) {
            return Err(VidmarkError::negotiation(format!(
                "ffmpeg encoder '{}' is not available",
                cfg.codec.as_str()
            )));
        }
        self.audio_cfg = Some(*cfg);
        Ok(())
    }

    fn begin_session(&mut self, start_secs: f64) -> VidmarkResult<()> {
        if start_secs != 0.0 {
            return Err(VidmarkError::encode(
                "ffmpeg writer sessions must start at time zero",
            ));
        }
        let cfg = self
            .video_cfg
            .ok_or_else(|| VidmarkError::encode("no video track was added"))?;

        let video_tmp = temp_path("video", "mp4");
        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.size.width, cfg.size.height),
            "-r",
            &format!("{}/{}", cfg.frame_rate.num, cfg.frame_rate.den),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            video_encoder_name(cfg.codec),
            "-b:v",
            &cfg.bitrate.to_string(),
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&video_tmp)
        .stdin(Stdio::piped())
        .stdout(Stdio::null());
        self.video_tmp = TempFileGuard(Some(video_tmp));

        let mut process = FfmpegProcess::spawn(&mut cmd).map_err(|e| {
            VidmarkError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = process
            .child
            .stdin
            .take()
            .ok_or_else(|| VidmarkError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        self.encoder = Some(VideoEncoder { process, stdin });
        self.last_frame = vec![0u8; cfg.size.rgba_len()];

        if self.audio_cfg.is_some() {
            let audio_tmp = temp_path("audio", "s16le");
            let file = File::create(&audio_tmp).with_context(|| {
                format!("failed to create audio spool '{}'", audio_tmp.display())
            })?;
            self.audio_tmp = TempFileGuard(Some(audio_tmp));
            self.pcm = Some(BufWriter::new(file));
        }
        Ok(())
    }

    fn video_ready(&mut self) -> bool {
        self.encoder.is_some()
    }

    fn audio_ready(&mut self) -> bool {
        self.pcm.is_some()
            && (self.video_finished || self.audio_end_secs() < self.last_video_pts + AUDIO_LEAD_SECS)
    }

    fn append_video(&mut self, frame: &PixelBuffer, pts_secs: f64) -> VidmarkResult<()> {
        let cfg = self
            .video_cfg
            .ok_or_else(|| VidmarkError::encode("no video track was added"))?;
        if frame.size() != cfg.size {
            return Err(VidmarkError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                cfg.size.width,
                cfg.size.height
            )));
        }

        let slot = cfg.frame_rate.secs_to_frames_round(pts_secs);
        self.last_video_pts = self.last_video_pts.max(pts_secs);
        let plan = plan_slots(self.next_slot, slot);
        if !plan.write_current {
            tracing::trace!(pts_secs, slot, "dropping frame that maps to a filled slot");
            return Ok(());
        }

        for _ in 0..plan.fill {
            let gap = std::mem::take(&mut self.last_frame);
            let fill = if plan.fill_with_current { frame.data() } else { &gap[..] };
            let res = self.write_slot(fill);
            self.last_frame = gap;
            res?;
        }
        self.write_slot(frame.data())?;
        self.last_frame.copy_from_slice(frame.data());
        Ok(())
    }

    fn append_audio(&mut self, sample: &AudioSample) -> VidmarkResult<()> {
        let cfg = self
            .audio_cfg
            .ok_or_else(|| VidmarkError::encode("no audio track was added"))?;
        if sample.channels != cfg.channels {
            return Err(VidmarkError::encode(format!(
                "audio chunk has {} channels, track expects {}",
                sample.channels, cfg.channels
            )));
        }
        let Some(pcm) = self.pcm.as_mut() else {
            return Err(VidmarkError::encode("audio input is not open"));
        };
        let silence =
            silence_frames_before(self.audio_frames_written, sample.pts_secs, cfg.sample_rate);
        if silence > 0 {
            let zeros = vec![0u8; silence as usize * usize::from(cfg.channels) * 2];
            pcm.write_all(&zeros)
                .map_err(|e| VidmarkError::encode(format!("failed to spool audio: {e}")))?;
            self.audio_frames_written += silence;
        }
        let mut bytes = Vec::with_capacity(sample.pcm.len() * 2);
        for s in &sample.pcm {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        pcm.write_all(&bytes)
            .map_err(|e| VidmarkError::encode(format!("failed to spool audio: {e}")))?;
        self.audio_frames_written += sample.frames() as u64;
        Ok(())
    }

    fn finish_video_input(&mut self) -> VidmarkResult<()> {
        self.video_finished = true;
        let Some(enc) = self.encoder.take() else {
            return Ok(());
        };
        drop(enc.stdin);
        enc.process.wait().map_err(VidmarkError::encode)
    }

    fn finish_audio_input(&mut self) -> VidmarkResult<()> {
        self.audio_finished = true;
        if let Some(mut pcm) = self.pcm.take() {
            pcm.flush()
                .map_err(|e| VidmarkError::encode(format!("failed to flush audio spool: {e}")))?;
        }
        Ok(())
    }

    fn cancel_writing(&mut self) {
        if let Some(enc) = self.encoder.take() {
            drop(enc.stdin);
            enc.process.kill();
        }
        self.pcm = None;
        self.video_tmp = TempFileGuard(None);
        self.audio_tmp = TempFileGuard(None);
        self.video_finished = true;
        self.audio_finished = true;
    }

    fn finish(mut self: Box<Self>) -> VidmarkResult<()> {
        if !self.video_finished {
            self.finish_video_input()?;
        }
        if !self.audio_finished {
            self.finish_audio_input()?;
        }
        let cfg = self
            .video_cfg
            .ok_or_else(|| VidmarkError::encode("no video track was added"))?;
        if self.next_slot == 0 {
            return Err(VidmarkError::encode("no video frames were written"));
        }
        self.mux(&cfg)?;
        tracing::debug!(
            frames = self.next_slot,
            audio_frames = self.audio_frames_written,
            out = %self.out_path.display(),
            "muxed output"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/ffmpeg.rs"]
mod tests;

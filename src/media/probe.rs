use std::path::Path;

use crate::foundation::core::{Affine, Fps, PixelSize, Size};
use crate::foundation::error::{VidmarkError, VidmarkResult};
use crate::geometry::orientation::{normalize_quarter_turns, orientation_for_rotation};
use crate::media::track::{AudioTrackDescriptor, VideoTrackDescriptor};

/// Track descriptors and duration of an input container.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct MediaProbe {
    pub video: VideoTrackDescriptor,
    pub audio: Option<AudioTrackDescriptor>,
    /// Container duration in seconds, `0.0` when unknown.
    pub duration_secs: f64,
    /// Container start time. Every timestamp handed to the pipeline is relative to it.
    pub origin_secs: f64,
    /// Offset of the first video frame from the origin.
    pub video_start_secs: f64,
    /// Offset of the first audio sample from the origin, `0.0` without audio.
    pub audio_start_secs: f64,
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    sample_aspect_ratio: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    start_time: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: std::collections::HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<serde_json::Value>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    start_time: Option<String>,
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Probe `path` with `ffprobe` and describe its first video and audio tracks.
#[cfg(feature = "media-ffmpeg")]
pub fn probe_tracks(path: &Path) -> VidmarkResult<MediaProbe> {
    if !path.is_file() {
        return Err(VidmarkError::input(format!(
            "input '{}' does not exist or is not a file",
            path.display()
        )));
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| VidmarkError::input(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(VidmarkError::input(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    parse_probe_json(&out.stdout)
}

#[cfg(not(feature = "media-ffmpeg"))]
pub fn probe_tracks(_path: &Path) -> VidmarkResult<MediaProbe> {
    Err(VidmarkError::input(
        "probing media requires the 'media-ffmpeg' feature",
    ))
}

/// Presentation timestamps of the first video stream's packets, sorted and made relative to
/// `origin_secs`.
#[cfg(feature = "media-ffmpeg")]
pub(crate) fn probe_video_pts(path: &Path, origin_secs: f64) -> VidmarkResult<Vec<f64>> {
    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts_time",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .map_err(|e| VidmarkError::input(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(VidmarkError::input(format!(
            "ffprobe packet listing failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(parse_pts_listing(
        &String::from_utf8_lossy(&out.stdout),
        origin_secs,
    ))
}

pub(crate) fn parse_pts_listing(listing: &str, origin_secs: f64) -> Vec<f64> {
    let mut pts: Vec<f64> = listing
        .lines()
        .filter_map(|l| l.trim().trim_end_matches(',').parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .map(|t| (t - origin_secs).max(0.0))
        .collect();
    pts.sort_by(f64::total_cmp);
    pts
}

pub(crate) fn parse_probe_json(bytes: &[u8]) -> VidmarkResult<MediaProbe> {
    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| VidmarkError::input(format!("ffprobe json parse failed: {e}")))?;

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| VidmarkError::input("input has no video track"))?;
    let video = video_descriptor(video_stream)?;

    let audio_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let audio = audio_stream.map(|s| {
        AudioTrackDescriptor::from_probe(
            s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
            s.channels,
        )
    });

    let video_start = parse_secs(video_stream.start_time.as_deref());
    let audio_start = audio_stream.and_then(|s| parse_secs(s.start_time.as_deref()));
    let origin_secs = parsed
        .format
        .as_ref()
        .and_then(|f| parse_secs(f.start_time.as_deref()))
        .or_else(|| {
            [video_start, audio_start]
                .into_iter()
                .flatten()
                .min_by(f64::total_cmp)
        })
        .unwrap_or(0.0);
    let offset = |start: Option<f64>| start.map_or(0.0, |t| (t - origin_secs).max(0.0));

    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video_stream.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    Ok(MediaProbe {
        video,
        audio,
        duration_secs,
        origin_secs,
        video_start_secs: offset(video_start),
        audio_start_secs: offset(audio_start),
    })
}

fn parse_secs(s: Option<&str>) -> Option<f64> {
    s.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn video_descriptor(s: &ProbeStream) -> VidmarkResult<VideoTrackDescriptor> {
    let pixel_size = match (s.width, s.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(PixelSize::new(w, h)),
        _ => None,
    };
    let Some(raw) = pixel_size else {
        return Err(VidmarkError::input("video track has no pixel dimensions"));
    };

    let sar = s
        .sample_aspect_ratio
        .as_deref()
        .and_then(parse_aspect)
        .unwrap_or(1.0);
    let natural_size = Size::new(f64::from(raw.width) * sar, f64::from(raw.height));

    let frame_rate = [s.avg_frame_rate.as_deref(), s.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(Fps::parse_ratio)
        .ok_or_else(|| VidmarkError::input("video track has no usable frame rate"))?;

    let rotation = clockwise_rotation(s);
    let orientation: Affine = orientation_for_rotation(rotation, raw);

    Ok(VideoTrackDescriptor {
        pixel_size,
        natural_size,
        frame_rate,
        orientation,
        pixel_format: s.pix_fmt.clone().unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Display rotation in clockwise degrees, from the legacy `rotate` tag or display-matrix side
/// data (whose `rotation` is counter-clockwise).
fn clockwise_rotation(s: &ProbeStream) -> u32 {
    if let Some(deg) = s.tags.get("rotate").and_then(|r| r.trim().parse::<f64>().ok()) {
        return normalize_quarter_turns(deg);
    }
    s.side_data_list
        .iter()
        .filter_map(|sd| sd.get("rotation").and_then(serde_json::Value::as_f64))
        .map(|ccw| normalize_quarter_turns(-ccw))
        .next()
        .unwrap_or(0)
}

fn parse_aspect(s: &str) -> Option<f64> {
    let (n, d) = s.split_once(':')?;
    let n = n.trim().parse::<f64>().ok()?;
    let d = d.trim().parse::<f64>().ok()?;
    (n > 0.0 && d > 0.0).then_some(n / d)
}

#[cfg(test)]
#[path = "../../tests/unit/media/probe.rs"]
mod tests;

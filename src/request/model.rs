use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context as _;

use crate::foundation::error::{VidmarkError, VidmarkResult};

/// Canvas reference point used to place the overlay before offsets are applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

/// How a margin or offset value is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LengthUnit {
    /// Value is in pixels.
    #[default]
    Absolute,
    /// Value is a fraction of the canvas width (x) or height (y).
    Percent,
}

/// Output video codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    Hevc,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = VidmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "hevc" | "h265" => Ok(Self::Hevc),
            other => Err(VidmarkError::validation(format!(
                "unknown codec '{other}' (expected h264 or hevc)"
            ))),
        }
    }
}

impl FromStr for Anchor {
    type Err = VidmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            "center" | "centre" => Ok(Self::Center),
            other => Err(VidmarkError::validation(format!("unknown anchor '{other}'"))),
        }
    }
}

impl FromStr for LengthUnit {
    type Err = VidmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "absolute" | "px" => Ok(Self::Absolute),
            "percent" | "%" => Ok(Self::Percent),
            other => Err(VidmarkError::validation(format!(
                "unknown length unit '{other}'"
            ))),
        }
    }
}

/// Overlay placement relative to the render canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OverlayPlacement {
    pub anchor: Anchor,
    pub margin: f64,
    pub margin_unit: LengthUnit,
    pub offset_x: f64,
    pub offset_y: f64,
    pub offset_unit: LengthUnit,
}

/// Minimal styling handed to the text rasterizer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Font size in pixels before the overlay is scaled to its target width.
    pub font_size_px: f32,
    /// Straight-alpha RGBA8 fill color.
    pub color_rgba: [u8; 4],
    /// CSS-style font family list.
    pub font_family: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size_px: 48.0,
            color_rgba: [255, 255, 255, 255],
            font_family: "sans-serif".to_string(),
        }
    }
}

/// Where the overlay pixels come from, after applying image-over-text precedence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WatermarkSource<'a> {
    Image(&'a [u8]),
    Text(&'a str),
}

/// One watermark job. Immutable once a task starts.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ComposeRequest {
    pub input_path: PathBuf,
    /// Output file; a temp path is generated when absent.
    pub output_path: Option<PathBuf>,
    /// Encoded watermark image bytes. Takes precedence over `text`.
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
    pub text: Option<String>,
    pub text_style: TextStyle,
    pub placement: OverlayPlacement,
    /// Overlay opacity in `[0, 1]`.
    pub opacity: f64,
    /// Overlay width as a fraction of render width, in `(0, 1]`.
    pub width_percent: f64,
    pub codec: VideoCodec,
    /// Explicit video bitrate in bits per second.
    pub bitrate: Option<u64>,
}

impl Default for ComposeRequest {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            output_path: None,
            image: None,
            text: None,
            text_style: TextStyle::default(),
            placement: OverlayPlacement::default(),
            opacity: 1.0,
            width_percent: 0.2,
            codec: VideoCodec::default(),
            bitrate: None,
        }
    }
}

#[derive(serde::Deserialize)]
struct RequestDoc {
    #[serde(flatten)]
    request: ComposeRequest,
    #[serde(default)]
    image_path: Option<PathBuf>,
}

impl ComposeRequest {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            ..Self::default()
        }
    }

    /// Load a request document from JSON.
    ///
    /// Relative `input_path`, `output_path`, and `image_path` entries resolve against the
    /// document's directory. `image_path` is read eagerly into `image`.
    pub fn from_json_path(path: &Path) -> VidmarkResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read request document '{}'", path.display()))?;
        let doc: RequestDoc = serde_json::from_slice(&bytes).map_err(|e| {
            VidmarkError::validation(format!(
                "invalid request document '{}': {e}",
                path.display()
            ))
        })?;

        let root = path.parent().unwrap_or_else(|| Path::new("."));
        let mut request = doc.request;
        request.input_path = resolve_against(root, &request.input_path);
        request.output_path = request
            .output_path
            .as_deref()
            .map(|p| resolve_against(root, p));
        if let Some(image_path) = doc.image_path {
            let image_path = resolve_against(root, &image_path);
            let bytes = std::fs::read(&image_path).with_context(|| {
                format!("read watermark image '{}'", image_path.display())
            })?;
            request.image = Some(bytes);
        }
        request.validate()?;
        Ok(request)
    }

    /// The watermark source to render, if any. Image bytes win over text; blank text is ignored.
    pub fn watermark_source(&self) -> Option<WatermarkSource<'_>> {
        if let Some(bytes) = self.image.as_deref()
            && !bytes.is_empty()
        {
            return Some(WatermarkSource::Image(bytes));
        }
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(WatermarkSource::Text)
    }

    pub fn validate(&self) -> VidmarkResult<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(VidmarkError::validation("input_path must be non-empty"));
        }
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(VidmarkError::validation("opacity must be within [0, 1]"));
        }
        if !self.width_percent.is_finite() || self.width_percent <= 0.0 || self.width_percent > 1.0
        {
            return Err(VidmarkError::validation(
                "width_percent must be within (0, 1]",
            ));
        }
        let p = &self.placement;
        if ![p.margin, p.offset_x, p.offset_y]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(VidmarkError::validation(
                "placement margin and offsets must be finite",
            ));
        }
        if p.margin < 0.0 {
            return Err(VidmarkError::validation("placement margin must be >= 0"));
        }
        if self.bitrate == Some(0) {
            return Err(VidmarkError::validation("bitrate must be > 0 when set"));
        }
        if !self.text_style.font_size_px.is_finite() || self.text_style.font_size_px <= 0.0 {
            return Err(VidmarkError::validation(
                "text_style.font_size_px must be finite and > 0",
            ));
        }
        Ok(())
    }
}

fn resolve_against(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() || p.as_os_str().is_empty() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/request/model.rs"]
mod tests;

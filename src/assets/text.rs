use std::sync::{Arc, OnceLock};

use crate::assets::decode::encode_png;
use crate::foundation::error::{VidmarkError, VidmarkResult};
use crate::foundation::math::unpremultiply_rgba8_in_place;
use crate::request::model::TextStyle;

/// Turns watermark text into encoded image bytes.
pub trait TextRasterizer: Send + Sync {
    /// Rasterize `text` with `style`, returning encoded image bytes (PNG for the built-in
    /// implementation).
    fn rasterize(&self, text: &str, style: &TextStyle) -> VidmarkResult<Vec<u8>>;
}

/// Text rasterizer backed by `usvg`/`resvg` and the system font database.
///
/// The font database is loaded lazily on first use and shared afterwards.
pub struct SvgTextRasterizer {
    fontdb: OnceLock<Arc<usvg::fontdb::Database>>,
    padding_px: u32,
}

impl Default for SvgTextRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgTextRasterizer {
    pub fn new() -> Self {
        Self {
            fontdb: OnceLock::new(),
            padding_px: 2,
        }
    }

    /// Use a pre-built font database instead of the system fonts.
    pub fn with_fontdb(db: usvg::fontdb::Database) -> Self {
        let fontdb = OnceLock::new();
        let _ = fontdb.set(Arc::new(db));
        Self {
            fontdb,
            padding_px: 2,
        }
    }

    /// Number of font faces available for text rendering.
    pub fn face_count(&self) -> usize {
        self.fontdb().faces().count()
    }

    fn fontdb(&self) -> Arc<usvg::fontdb::Database> {
        self.fontdb
            .get_or_init(|| {
                let mut db = usvg::fontdb::Database::new();
                db.load_system_fonts();
                tracing::debug!(faces = db.faces().count(), "loaded system fonts");
                Arc::new(db)
            })
            .clone()
    }
}

impl TextRasterizer for SvgTextRasterizer {
    fn rasterize(&self, text: &str, style: &TextStyle) -> VidmarkResult<Vec<u8>> {
        let svg = text_svg_document(text, style);
        let opts = usvg::Options {
            fontdb: self.fontdb(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_data(svg.as_bytes(), &opts)
            .map_err(|e| VidmarkError::overlay(format!("text svg parse failed: {e}")))?;

        let root = tree.root();
        let bbox = root.abs_bounding_box();
        if !root.has_children() || bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return Err(VidmarkError::overlay(
                "text rasterization produced no glyphs (no usable fonts?)",
            ));
        }

        let pad = self.padding_px as f32;
        let width = bbox.width().ceil() as u32 + 2 * self.padding_px;
        let height = bbox.height().ceil() as u32 + 2 * self.padding_px;
        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| VidmarkError::overlay("failed to allocate text pixmap"))?;
        let xform = resvg::tiny_skia::Transform::from_translate(pad - bbox.x(), pad - bbox.y());
        resvg::render(&tree, xform, &mut pixmap.as_mut());

        let mut rgba = pixmap.take();
        unpremultiply_rgba8_in_place(&mut rgba);
        let img = image::RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| VidmarkError::overlay("text pixmap size mismatch"))?;
        encode_png(img)
    }
}

/// Build a standalone SVG document drawing `text` one `<tspan>` per line.
pub(crate) fn text_svg_document(text: &str, style: &TextStyle) -> String {
    let size = style.font_size_px;
    let [r, g, b, a] = style.color_rgba;
    let lines: Vec<&str> = text.lines().collect();
    let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let canvas_w = ((longest as f32 + 1.0) * size).ceil();
    let canvas_h = ((lines.len() as f32 + 1.0) * size * 1.3).ceil();

    let mut spans = String::new();
    for (i, line) in lines.iter().enumerate() {
        let dy = if i == 0 { "0".to_string() } else { format!("{}", size * 1.2) };
        spans.push_str(&format!(
            r#"<tspan x="0" dy="{dy}">{}</tspan>"#,
            escape_xml(line)
        ));
    }

    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{canvas_w}" height="{canvas_h}"><text x="0" y="{size}" font-family="{}" font-size="{size}" fill="rgb({r},{g},{b})" fill-opacity="{}" xml:space="preserve">{spans}</text></svg>"#,
        escape_xml(&style.font_family),
        f32::from(a) / 255.0,
    )
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/assets/text.rs"]
mod tests;

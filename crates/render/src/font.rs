//! Font lookup and text rasterization
//!
//! Text annotations name a font (`Helvetica` by default). Names resolve
//! against fonts registered in a [`FontBook`]; anything unknown falls back to
//! the book's default font so a missing face never blanks a page.

use crate::RenderError;
use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use pdf_markup_core::{Color, TextAlignment};
use std::collections::HashMap;
use std::fmt;
use tiny_skia::{IntSize, Pixmap};

/// Locations tried by [`FontBook::with_system_fonts`], in order
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Helvetica.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Named fonts plus a fallback
#[derive(Clone, Default)]
pub struct FontBook {
    fonts: HashMap<String, FontArc>,
    fallback: Option<FontArc>,
}

impl fmt::Debug for FontBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontBook")
            .field("fonts", &self.fonts.keys().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl FontBook {
    /// Empty book; text renders only after a font is registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Book whose fallback is the first readable platform font
    pub fn with_system_fonts() -> Self {
        let mut book = Self::new();
        for path in SYSTEM_FONT_CANDIDATES {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            if let Ok(font) = FontArc::try_from_vec(bytes) {
                tracing::debug!(path, "using system fallback font");
                book.fallback = Some(font);
                break;
            }
        }
        if book.fallback.is_none() {
            tracing::warn!("no system font found, text annotations will not render");
        }
        book
    }

    /// Register a TrueType/OpenType face under `name` (case-insensitive)
    pub fn register(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), RenderError> {
        let font = FontArc::try_from_vec(bytes).map_err(|_| RenderError::InvalidFont)?;
        if self.fallback.is_none() {
            self.fallback = Some(font.clone());
        }
        self.fonts.insert(name.to_lowercase(), font);
        Ok(())
    }

    pub fn set_fallback(&mut self, bytes: Vec<u8>) -> Result<(), RenderError> {
        self.fallback = Some(FontArc::try_from_vec(bytes).map_err(|_| RenderError::InvalidFont)?);
        Ok(())
    }

    /// The face for `name`, else the fallback
    pub fn resolve(&self, name: &str) -> Option<&FontArc> {
        self.fonts.get(&name.to_lowercase()).or(self.fallback.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty() && self.fallback.is_none()
    }
}

/// Parameters for laying text out inside a box
pub(crate) struct TextLayout<'a> {
    pub text: &'a str,
    /// Font size in layer pixels
    pub px_size: f32,
    /// Inner margin in layer pixels
    pub inset: f32,
    pub alignment: TextAlignment,
    pub color: Color,
    pub opacity: f32,
}

fn line_width<F: Font>(font: &ab_glyph::PxScaleFont<&F>, line: &str) -> f32 {
    let mut width = 0.0;
    let mut previous: Option<GlyphId> = None;
    for ch in line.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = previous {
            width += font.kern(prev, id);
        }
        width += font.h_advance(id);
        previous = Some(id);
    }
    width
}

/// Greedy word wrap; explicit newlines always break
fn wrap_lines<F: Font>(font: &ab_glyph::PxScaleFont<&F>, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate =
                if current.is_empty() { word.to_string() } else { format!("{current} {word}") };
            if !current.is_empty() && line_width(font, &candidate) > max_width {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        lines.push(current);
    }
    lines
}

/// Rasterize text into a transparent `width`x`height` premultiplied layer
pub(crate) fn rasterize_text(
    font: &FontArc,
    layout: &TextLayout<'_>,
    width: u32,
    height: u32,
) -> Result<Pixmap, RenderError> {
    let size = IntSize::from_wh(width, height).ok_or(RenderError::Allocation { width, height })?;
    let mut data = vec![0u8; width as usize * height as usize * 4];

    let scale = PxScale::from(layout.px_size);
    let scaled = font.as_scaled(scale);
    let max_width = (width as f32 - 2.0 * layout.inset).max(0.0);
    let line_height = scaled.height() + scaled.line_gap();
    let (r, g, b, a) = layout.color.to_normalized();
    let alpha = a * layout.opacity.clamp(0.0, 1.0);

    let mut baseline = layout.inset + scaled.ascent();
    for line in wrap_lines(&scaled, layout.text, max_width) {
        if baseline - scaled.ascent() > height as f32 {
            break;
        }
        let measured = line_width(&scaled, &line);
        let mut x = match layout.alignment {
            TextAlignment::Left => layout.inset,
            TextAlignment::Center => (width as f32 - measured) / 2.0,
            TextAlignment::Right => width as f32 - layout.inset - measured,
        };

        let mut previous: Option<GlyphId> = None;
        for ch in line.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                x += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(x, baseline));
            x += scaled.h_advance(id);
            previous = Some(id);

            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i64 + gx as i64;
                let py = bounds.min.y as i64 + gy as i64;
                if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                    return;
                }
                let src = coverage.clamp(0.0, 1.0) * alpha;
                let index = (py as usize * width as usize + px as usize) * 4;
                let pixel = &mut data[index..index + 4];
                // Premultiplied source-over
                for (channel, value) in pixel.iter_mut().zip([r, g, b, 1.0]) {
                    let dst = *channel as f32 / 255.0;
                    *channel = ((value * src + dst * (1.0 - src)) * 255.0).round() as u8;
                }
            });
        }
        baseline += line_height;
    }

    Pixmap::from_vec(data, size).ok_or(RenderError::Allocation { width, height })
}

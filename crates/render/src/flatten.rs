//! Flattened export
//!
//! Each exportable annotation is rasterized alone onto a transparent image
//! covering its rotated bounds plus stroke bleed, then embedded into the
//! PDF page as an image stamp at that same page-space box. Rotation is baked
//! into the pixels, so the stamp itself is always axis-aligned.

use crate::draw::{paint_annotation, visual_bounds, MAX_LAYER_SIDE};
use crate::font::FontBook;
use crate::RenderError;
use image::{Rgba, RgbaImage};
use pdf_markup_core::{Affine, Annotation, AnnotationId, Rect, Tool};
use pdf_markup_engine::{PageSource, PageStamp, PdfDocument, PdfEngineError, StampBlend};
use std::fmt;
use thiserror::Error;
use tiny_skia::{BlendMode, Pixmap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampOptions {
    /// Raster pixels per PDF unit
    pub scale: f32,
}

impl Default for StampOptions {
    fn default() -> Self {
        Self { scale: 2.0 }
    }
}

impl StampOptions {
    fn effective_scale(&self) -> f32 {
        if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }
}

/// Why an annotation was left out of an export
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotExportable(Tool),
    Invalid(String),
    PageOutOfRange(u32),
    Render(String),
    /// Rasterized to fully transparent pixels
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotExportable(tool) => {
                write!(f, "{} annotations are not exported", tool.as_str())
            }
            SkipReason::Invalid(reason) => write!(f, "invalid geometry: {reason}"),
            SkipReason::PageOutOfRange(page) => write!(f, "page {page} is not in the document"),
            SkipReason::Render(reason) => write!(f, "render failed: {reason}"),
            SkipReason::Empty => f.write_str("nothing visible to stamp"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub stamped: Vec<AnnotationId>,
    pub skipped: Vec<(AnnotationId, SkipReason)>,
}

impl ExportReport {
    fn skip(&mut self, id: AnnotationId, reason: SkipReason) {
        tracing::debug!(%id, %reason, "annotation left out of export");
        self.skipped.push((id, reason));
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
}

/// Rasterize one annotation into a stamp positioned in page space
pub fn rasterize_stamp(
    annotation: &Annotation,
    fonts: &FontBook,
    options: &StampOptions,
) -> Result<PageStamp, RenderError> {
    annotation.validate()?;
    let scale = options.effective_scale();
    let bounds = visual_bounds(annotation);

    let width = (bounds.width() * scale).ceil().max(1.0);
    let height = (bounds.height() * scale).ceil().max(1.0);
    if width > MAX_LAYER_SIDE as f32 || height > MAX_LAYER_SIDE as f32 {
        return Err(RenderError::Allocation { width: width as u32, height: height as u32 });
    }
    let (width, height) = (width as u32, height as u32);
    let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Allocation { width, height })?;

    // Image rows run top-down while page y runs bottom-up
    let page_to_image =
        Affine::new(scale, 0.0, 0.0, -scale, -bounds.min_x() * scale, bounds.max_y() * scale);
    paint_annotation(&mut pixmap, annotation, &page_to_image, fonts, BlendMode::SourceOver)?;

    let mut image = RgbaImage::new(width, height);
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let placed_height = height as f32 / scale;
    Ok(PageStamp {
        page_index: annotation.page_index(),
        placement: Rect::new(
            bounds.min_x(),
            bounds.max_y() - placed_height,
            width as f32 / scale,
            placed_height,
        ),
        image,
        blend: match annotation.tool() {
            Tool::Highlighter => StampBlend::Multiply,
            _ => StampBlend::Normal,
        },
    })
}

/// Stamps for every exportable annotation, in page then z order
pub fn collect_stamps(
    annotations: &[Annotation],
    page_count: u32,
    fonts: &FontBook,
    options: &StampOptions,
) -> (Vec<PageStamp>, ExportReport) {
    let mut ordered: Vec<&Annotation> = annotations.iter().collect();
    ordered.sort_by_key(|a| (a.page_index(), a.z_index()));

    let mut stamps = Vec::new();
    let mut report = ExportReport::default();
    for annotation in ordered {
        let id = annotation.id();
        if !annotation.tool().is_exportable() {
            report.skip(id, SkipReason::NotExportable(annotation.tool()));
            continue;
        }
        if annotation.page_index() >= page_count {
            report.skip(id, SkipReason::PageOutOfRange(annotation.page_index()));
            continue;
        }
        match rasterize_stamp(annotation, fonts, options) {
            Ok(stamp) if stamp.image.pixels().all(|p| p.0[3] == 0) => {
                report.skip(id, SkipReason::Empty);
            }
            Ok(stamp) => {
                stamps.push(stamp);
                report.stamped.push(id);
            }
            Err(RenderError::Invalid(err)) => {
                report.skip(id, SkipReason::Invalid(err.to_string()));
            }
            Err(err) => report.skip(id, SkipReason::Render(err.to_string())),
        }
    }
    (stamps, report)
}

/// Flatten `annotations` into a copy of `source_pdf`
///
/// Annotations that cannot be stamped are listed in the report; only a
/// source document that cannot be read or written is an error.
pub fn export_flattened(
    source_pdf: &[u8],
    annotations: &[Annotation],
    fonts: &FontBook,
    options: &StampOptions,
) -> Result<(Vec<u8>, ExportReport), ExportError> {
    let mut doc = PdfDocument::load_mem(source_pdf)?;
    let (stamps, report) = collect_stamps(annotations, doc.page_count(), fonts, options);
    doc.apply_stamps(&stamps)?;
    let bytes = doc.save_to_vec()?;
    tracing::info!(
        stamped = report.stamped.len(),
        skipped = report.skipped.len(),
        bytes = bytes.len(),
        "flattened export written"
    );
    Ok((bytes, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_markup_core::{Color, PathSegment, Point};
    use pdf_markup_engine::LETTER;

    fn blank_pdf(pages: usize) -> Vec<u8> {
        PdfDocument::blank(&vec![LETTER; pages]).unwrap().save_to_vec().unwrap()
    }

    fn boxed(tool: Tool, frame: Rect, page: u32) -> Annotation {
        let mut ann = Annotation::new(tool, frame, page);
        ann.properties_mut().fill_color = Some(Color::BLUE);
        ann
    }

    #[test]
    fn selection_tool_is_never_stamped() {
        let selection = Annotation::new(Tool::Selection, Rect::new(10.0, 10.0, 50.0, 50.0), 0);
        let eraser = Annotation::new(Tool::Eraser, Rect::new(10.0, 10.0, 50.0, 50.0), 0);
        let rect = boxed(Tool::Rectangle, Rect::new(100.0, 100.0, 50.0, 50.0), 0);
        let annotations = vec![selection.clone(), eraser, rect.clone()];

        let (bytes, report) = export_flattened(
            &blank_pdf(1),
            &annotations,
            &FontBook::new(),
            &StampOptions::default(),
        )
        .unwrap();

        assert_eq!(report.stamped, vec![rect.id()]);
        assert!(report
            .skipped
            .contains(&(selection.id(), SkipReason::NotExportable(Tool::Selection))));
        let doc = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.image_count(0).unwrap(), 1);
    }

    #[test]
    fn zero_width_frame_is_skipped_without_error() {
        let thin = boxed(Tool::Rectangle, Rect::new(100.0, 100.0, 0.0, 50.0), 0);

        let (bytes, report) = export_flattened(
            &blank_pdf(1),
            std::slice::from_ref(&thin),
            &FontBook::new(),
            &StampOptions::default(),
        )
        .unwrap();

        assert!(report.stamped.is_empty());
        assert!(matches!(
            report.skipped.as_slice(),
            [(id, SkipReason::Invalid(_))] if *id == thin.id()
        ));
        assert_eq!(PdfDocument::load_mem(&bytes).unwrap().image_count(0).unwrap(), 0);
    }

    #[test]
    fn annotation_past_last_page_is_reported() {
        let stray = boxed(Tool::Oval, Rect::new(10.0, 10.0, 30.0, 30.0), 4);
        let (stamps, report) =
            collect_stamps(&[stray], 2, &FontBook::new(), &StampOptions::default());
        assert!(stamps.is_empty());
        assert_eq!(report.skipped[0].1, SkipReason::PageOutOfRange(4));
    }

    #[test]
    fn stamps_follow_page_then_z_order() {
        let a = boxed(Tool::Rectangle, Rect::new(10.0, 10.0, 30.0, 30.0), 1);
        let b = boxed(Tool::Oval, Rect::new(10.0, 10.0, 30.0, 30.0), 0);
        let (stamps, report) =
            collect_stamps(&[a.clone(), b.clone()], 2, &FontBook::new(), &StampOptions::default());
        assert_eq!(report.stamped, vec![b.id(), a.id()]);
        assert_eq!(stamps.iter().map(|s| s.page_index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn upward_arrow_head_is_at_image_top() {
        let mut arrow = Annotation::new(Tool::Arrow, Rect::new(49.0, 10.0, 2.0, 80.0), 0);
        arrow.properties_mut().stroke_width = 2.0;
        arrow.properties_mut().path = vec![
            PathSegment::MoveTo { to: Point::new(50.0, 10.0) },
            PathSegment::LineTo { to: Point::new(50.0, 90.0) },
        ];

        let options = StampOptions { scale: 1.0 };
        let stamp = rasterize_stamp(&arrow, &FontBook::new(), &options).unwrap();

        let (width, height) = stamp.image.dimensions();
        let ink_per_row: Vec<usize> = (0..height)
            .map(|y| (0..width).filter(|&x| stamp.image.get_pixel(x, y).0[3] > 0).count())
            .collect();
        let widest = (0..height as usize).max_by_key(|&y| ink_per_row[y]).unwrap();
        assert!(widest < height as usize / 2, "head drawn at row {widest} of {height}");
    }

    #[test]
    fn placement_covers_rotated_bounds() {
        let mut bar = boxed(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 10.0), 0);
        bar.set_rotation(90.0);

        let stamp = rasterize_stamp(&bar, &FontBook::new(), &StampOptions::default()).unwrap();

        let bounds = bar.rotated_bounds();
        assert!(stamp.placement.min_x() <= bounds.min_x());
        assert!(stamp.placement.max_x() >= bounds.max_x());
        assert!(stamp.placement.min_y() <= bounds.min_y());
        assert!(stamp.placement.max_y() >= bounds.max_y());
        // Rotation is baked into the pixels
        let (width, height) = stamp.image.dimensions();
        assert!(height > width * 3);
    }

    #[test]
    fn highlighter_stamps_multiply() {
        let mut mark = Annotation::new(Tool::Highlighter, Rect::new(10.0, 10.0, 100.0, 14.0), 0);
        mark.properties_mut().path = vec![
            PathSegment::MoveTo { to: Point::new(10.0, 17.0) },
            PathSegment::LineTo { to: Point::new(110.0, 17.0) },
        ];
        let stamp = rasterize_stamp(&mark, &FontBook::new(), &StampOptions::default()).unwrap();
        assert_eq!(stamp.blend, StampBlend::Multiply);
        // Straight alpha keeps the ink color intact at half opacity
        let center = stamp.image.get_pixel(stamp.image.width() / 2, stamp.image.height() / 2);
        assert_eq!(center.0[0], 255);
        assert!((120..=136).contains(&center.0[3]));
    }

    #[test]
    fn text_without_font_or_background_is_empty() {
        let mut text = Annotation::new(Tool::Text, Rect::new(10.0, 10.0, 100.0, 30.0), 0);
        text.properties_mut().text = "Hello".into();
        let (stamps, report) =
            collect_stamps(&[text], 1, &FontBook::new(), &StampOptions::default());
        assert!(stamps.is_empty());
        assert_eq!(report.skipped[0].1, SkipReason::Empty);
    }

    #[test]
    fn unreadable_source_is_an_error() {
        let result = export_flattened(b"nope", &[], &FontBook::new(), &StampOptions::default());
        assert!(matches!(result, Err(ExportError::Engine(_))));
    }
}

//! Per-tool painting of a single annotation
//!
//! Every routine paints in page space through one transform:
//! `rotate about frame center -> page_to_target`. Content with an intrinsic
//! "up" (text, signature images) is rasterized upright into a layer first
//! and then drawn through the same transform, so the page's y-up axis never
//! turns it upside down.

use crate::font::{rasterize_text, FontBook, TextLayout};
use crate::RenderError;
use pdf_markup_core::{
    Affine, Annotation, ArrowHead, Color, PathSegment, Point, Properties, Rect, Tool,
};
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, IntSize, LineCap, LineJoin, Paint, Path, PathBuilder,
    Pixmap, PixmapPaint, Stroke, StrokeDash, Transform,
};

/// Largest side, in pixels, of any intermediate layer
pub(crate) const MAX_LAYER_SIDE: u32 = 8192;

/// Page-unit margin between a text frame and its glyphs
const TEXT_INSET: f32 = 2.0;

/// Cubic control distance that approximates a quarter circle
const KAPPA: f32 = 0.552_284_8;

pub(crate) fn to_skia(t: &Affine) -> Transform {
    Transform::from_row(t.a, t.b, t.c, t.d, t.tx, t.ty)
}

/// Highlighter ink multiplies with the page; everything else paints over it
pub fn blend_mode(annotation: &Annotation) -> BlendMode {
    match annotation.tool() {
        Tool::Highlighter => BlendMode::Multiply,
        _ => BlendMode::SourceOver,
    }
}

fn arrow_head_length(props: &Properties) -> f32 {
    (props.stroke_width * 4.0).max(10.0)
}

/// Page units outside the rotated frame that strokes and arrow heads reach
pub fn bleed(annotation: &Annotation) -> f32 {
    let props = annotation.properties();
    let head = match annotation.tool() {
        Tool::Arrow => arrow_head_length(props),
        _ => 0.0,
    };
    props.stroke_width.max(0.0) + head + 1.0
}

/// Page-space box covering every pixel the annotation can paint
pub fn visual_bounds(annotation: &Annotation) -> Rect {
    annotation.rotated_bounds().outset(bleed(annotation))
}

fn paint_for(color: Color, opacity: f32, blend: BlendMode) -> Paint<'static> {
    let mut paint = Paint::default();
    let alpha = (color.a as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
    paint.set_color_rgba8(color.r, color.g, color.b, alpha);
    paint.anti_alias = true;
    paint.blend_mode = blend;
    paint
}

fn stroke_for(props: &Properties, cap: LineCap, join: LineJoin) -> Stroke {
    let mut stroke = Stroke {
        width: props.stroke_width.max(0.0),
        line_cap: cap,
        line_join: join,
        ..Stroke::default()
    };
    if !props.dash_pattern.is_empty() {
        stroke.dash = StrokeDash::new(props.dash_pattern.clone(), 0.0);
    }
    stroke
}

fn skia_rect(rect: &Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_ltrb(rect.min_x(), rect.min_y(), rect.max_x(), rect.max_y())
}

/// Paint one annotation onto `target`
///
/// `page_to_target` maps page space to target pixels. Selection and eraser
/// entries paint nothing.
pub fn paint_annotation(
    target: &mut Pixmap,
    annotation: &Annotation,
    page_to_target: &Affine,
    fonts: &FontBook,
    blend: BlendMode,
) -> Result<(), RenderError> {
    let frame = annotation.frame();
    let transform =
        Affine::rotate_about(frame.center(), annotation.rotation()).then(page_to_target);
    let mut painter = Painter { target, transform, blend, props: annotation.properties() };

    match annotation.tool() {
        Tool::Pen | Tool::Highlighter => painter.ink(annotation),
        Tool::Rectangle => painter.rectangle(&frame),
        Tool::Oval => painter.oval(&frame),
        Tool::Line | Tool::Arrow => painter.line(annotation),
        Tool::Polygon => painter.polygon(annotation),
        Tool::Text => painter.text(&frame, fonts),
        Tool::Signature => painter.signature(&frame),
        Tool::Note => painter.note(&frame),
        Tool::Magnifier => painter.magnifier(&frame),
        Tool::Selection | Tool::Eraser => Ok(()),
    }
}

struct Painter<'a> {
    target: &'a mut Pixmap,
    transform: Affine,
    blend: BlendMode,
    props: &'a Properties,
}

impl Painter<'_> {
    fn fill(&mut self, path: &Path, color: Color) {
        let paint = paint_for(color, self.props.opacity, self.blend);
        self.target.fill_path(path, &paint, FillRule::Winding, to_skia(&self.transform), None);
    }

    fn stroke(&mut self, path: &Path, stroke: &Stroke) {
        if stroke.width <= 0.0 {
            return;
        }
        let paint = paint_for(self.props.stroke_color, self.props.opacity, self.blend);
        self.target.stroke_path(path, &paint, stroke, to_skia(&self.transform), None);
    }

    fn fill_and_stroke(&mut self, path: &Path, join: LineJoin) {
        if let Some(fill) = self.props.fill_color {
            self.fill(path, fill);
        }
        let stroke = stroke_for(self.props, LineCap::Butt, join);
        self.stroke(path, &stroke);
    }

    fn ink(&mut self, annotation: &Annotation) -> Result<(), RenderError> {
        let props = self.props;
        let map = annotation.path_to_frame();
        if let [PathSegment::MoveTo { to }] = props.path.as_slice() {
            // A tap leaves a dot
            let center = map.apply(*to);
            let radius = (props.stroke_width / 2.0).max(0.5);
            let dot = PathBuilder::from_circle(center.x, center.y, radius)
                .ok_or(RenderError::EmptyPath)?;
            self.fill(&dot, props.stroke_color);
            return Ok(());
        }
        let path = build_path(&props.path, &map, true).ok_or(RenderError::EmptyPath)?;
        let stroke = stroke_for(props, LineCap::Round, LineJoin::Round);
        self.stroke(&path, &stroke);
        Ok(())
    }

    fn rectangle(&mut self, frame: &Rect) -> Result<(), RenderError> {
        let rect = skia_rect(frame).ok_or(RenderError::EmptyPath)?;
        let path = rounded_rect(rect, self.props.corner_radius).ok_or(RenderError::EmptyPath)?;
        self.fill_and_stroke(&path, LineJoin::Miter);
        Ok(())
    }

    fn oval(&mut self, frame: &Rect) -> Result<(), RenderError> {
        let rect = skia_rect(frame).ok_or(RenderError::EmptyPath)?;
        let path = PathBuilder::from_oval(rect).ok_or(RenderError::EmptyPath)?;
        self.fill_and_stroke(&path, LineJoin::Round);
        Ok(())
    }

    fn polygon(&mut self, annotation: &Annotation) -> Result<(), RenderError> {
        let path = build_path(&self.props.path, &annotation.path_to_frame(), false)
            .ok_or(RenderError::EmptyPath)?;
        self.fill_and_stroke(&path, LineJoin::Miter);
        Ok(())
    }

    fn line(&mut self, annotation: &Annotation) -> Result<(), RenderError> {
        let map = annotation.path_to_frame();
        let frame = annotation.frame();
        let points: Vec<Point> =
            self.props.path.iter().filter_map(PathSegment::end_point).collect();
        let (start, end) = match (points.first(), points.last()) {
            (Some(&a), Some(&b)) if points.len() >= 2 => (map.apply(a), map.apply(b)),
            _ => (frame.origin, Point::new(frame.max_x(), frame.max_y())),
        };

        let (dx, dy) = (end.x - start.x, end.y - start.y);
        let length = (dx * dx + dy * dy).sqrt();
        if length <= f32::EPSILON {
            return Err(RenderError::EmptyPath);
        }
        let (ux, uy) = (dx / length, dy / length);

        let is_arrow = annotation.tool() == Tool::Arrow;
        let head = arrow_head_length(self.props).min(length);
        let shaft_end = if is_arrow && self.props.arrow_head == ArrowHead::Closed {
            Point::new(end.x - ux * head * 0.5, end.y - uy * head * 0.5)
        } else {
            end
        };

        let mut pb = PathBuilder::new();
        pb.move_to(start.x, start.y);
        pb.line_to(shaft_end.x, shaft_end.y);
        let shaft = pb.finish().ok_or(RenderError::EmptyPath)?;
        let stroke = stroke_for(self.props, LineCap::Round, LineJoin::Round);
        self.stroke(&shaft, &stroke);

        if !is_arrow || self.props.arrow_head == ArrowHead::None {
            return Ok(());
        }

        let base = Point::new(end.x - ux * head, end.y - uy * head);
        let half_width = head * 0.5;
        let left = Point::new(base.x - uy * half_width, base.y + ux * half_width);
        let right = Point::new(base.x + uy * half_width, base.y - ux * half_width);

        let mut pb = PathBuilder::new();
        pb.move_to(left.x, left.y);
        pb.line_to(end.x, end.y);
        pb.line_to(right.x, right.y);
        if self.props.arrow_head == ArrowHead::Closed {
            pb.close();
            let head_path = pb.finish().ok_or(RenderError::EmptyPath)?;
            self.fill(&head_path, self.props.stroke_color);
        } else {
            let head_path = pb.finish().ok_or(RenderError::EmptyPath)?;
            let mut open = stroke_for(self.props, LineCap::Round, LineJoin::Miter);
            open.dash = None;
            self.stroke(&head_path, &open);
        }
        Ok(())
    }

    fn note(&mut self, frame: &Rect) -> Result<(), RenderError> {
        let rect = skia_rect(frame).ok_or(RenderError::EmptyPath)?;
        let side = frame.width().min(frame.height());
        let badge = rounded_rect(rect, side * 0.2).ok_or(RenderError::EmptyPath)?;
        self.fill(&badge, self.props.fill_color.unwrap_or(Color::NOTE_YELLOW));

        let outline = Stroke { width: (side * 0.06).max(0.5), ..Stroke::default() };
        self.stroke(&badge, &outline);

        // Three text lines, longest first, measured from the top edge
        let mut pb = PathBuilder::new();
        for (i, fraction) in [0.8, 0.8, 0.55].iter().enumerate() {
            let y = frame.max_y() - frame.height() * (0.32 + 0.18 * i as f32);
            let x0 = frame.min_x() + frame.width() * 0.22;
            pb.move_to(x0, y);
            pb.line_to(x0 + (frame.width() * 0.56) * fraction / 0.8, y);
        }
        if let Some(lines) = pb.finish() {
            let line_stroke = Stroke {
                width: (side * 0.08).max(0.5),
                line_cap: LineCap::Round,
                ..Stroke::default()
            };
            self.stroke(&lines, &line_stroke);
        }
        Ok(())
    }

    fn magnifier(&mut self, frame: &Rect) -> Result<(), RenderError> {
        let rect = skia_rect(frame).ok_or(RenderError::EmptyPath)?;
        let lens = PathBuilder::from_oval(rect).ok_or(RenderError::EmptyPath)?;
        let tint = self.props.fill_color.unwrap_or(self.props.stroke_color.with_alpha(24));
        self.fill(&lens, tint);
        let stroke = stroke_for(self.props, LineCap::Round, LineJoin::Round);
        self.stroke(&lens, &stroke);
        Ok(())
    }

    fn text(&mut self, frame: &Rect, fonts: &FontBook) -> Result<(), RenderError> {
        if let Some(background) = self.props.fill_color {
            let rect = skia_rect(frame).ok_or(RenderError::EmptyPath)?;
            self.fill(&PathBuilder::from_rect(rect), background);
        }
        if self.props.text.trim().is_empty() {
            return Ok(());
        }
        let Some(font) = fonts.resolve(&self.props.font_name) else {
            tracing::debug!(font = %self.props.font_name, "no font available, text skipped");
            return Ok(());
        };

        let density = self.transform.mean_scale().max(f32::EPSILON);
        let (width, height) = layer_size(frame, density)?;
        let layout = TextLayout {
            text: &self.props.text,
            px_size: self.props.font_size * density,
            inset: TEXT_INSET * density,
            alignment: self.props.alignment,
            color: self.props.stroke_color,
            opacity: self.props.opacity,
        };
        let layer = rasterize_text(font, &layout, width, height)?;
        self.draw_upright(&layer, frame, 1.0);
        Ok(())
    }

    fn signature(&mut self, frame: &Rect) -> Result<(), RenderError> {
        let bytes = self.props.signature.as_deref().ok_or(RenderError::MissingImage)?;
        let decoded = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        let size = IntSize::from_wh(width, height).ok_or(RenderError::MissingImage)?;
        let premultiplied = decoded
            .pixels()
            .flat_map(|p| {
                let [r, g, b, a] = p.0;
                let pm = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
                [pm(r), pm(g), pm(b), a]
            })
            .collect();
        let layer =
            Pixmap::from_vec(premultiplied, size).ok_or(RenderError::Allocation { width, height })?;
        let opacity = self.props.opacity;
        self.draw_upright(&layer, frame, opacity);
        Ok(())
    }

    /// Draw a top-down layer stretched over the frame
    fn draw_upright(&mut self, layer: &Pixmap, frame: &Rect, opacity: f32) {
        let layer_to_frame =
            Affine::scale(frame.width() / layer.width() as f32, frame.height() / layer.height() as f32);
        // Layer rows run downward from the frame's top edge
        let frame_to_page = Affine::new(1.0, 0.0, 0.0, -1.0, frame.min_x(), frame.max_y());
        let transform = layer_to_frame.then(&frame_to_page).then(&self.transform);
        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            blend_mode: self.blend,
            quality: FilterQuality::Bilinear,
        };
        self.target.draw_pixmap(0, 0, layer.as_ref(), &paint, to_skia(&transform), None);
    }
}

fn layer_size(frame: &Rect, density: f32) -> Result<(u32, u32), RenderError> {
    let width = (frame.width() * density).ceil().max(1.0);
    let height = (frame.height() * density).ceil().max(1.0);
    if width > MAX_LAYER_SIDE as f32 || height > MAX_LAYER_SIDE as f32 {
        return Err(RenderError::Allocation { width: width as u32, height: height as u32 });
    }
    Ok((width as u32, height as u32))
}

/// Build a tiny-skia path from stored segments mapped through `map`
///
/// With `smooth`, runs of straight segments become quadratic curves through
/// the midpoints between samples.
fn build_path(segments: &[PathSegment], map: &Affine, smooth: bool) -> Option<Path> {
    let mut pb = PathBuilder::new();
    let mut previous: Option<Point> = None;
    // Last sample of a smoothed run whose final stretch is still open
    let mut open_tail: Option<Point> = None;

    for segment in segments {
        let smoothing = smooth && matches!(segment, PathSegment::LineTo { .. });
        if !smoothing {
            if let Some(tail) = open_tail.take() {
                pb.line_to(tail.x, tail.y);
            }
        }
        match *segment {
            PathSegment::MoveTo { to } => {
                let p = map.apply(to);
                pb.move_to(p.x, p.y);
                previous = Some(p);
            }
            PathSegment::LineTo { to } => {
                let p = map.apply(to);
                match (smoothing, previous) {
                    (true, Some(prev)) => {
                        pb.quad_to(prev.x, prev.y, (prev.x + p.x) / 2.0, (prev.y + p.y) / 2.0);
                        open_tail = Some(p);
                    }
                    _ => pb.line_to(p.x, p.y),
                }
                previous = Some(p);
            }
            PathSegment::QuadTo { ctrl, to } => {
                let (c, p) = (map.apply(ctrl), map.apply(to));
                pb.quad_to(c.x, c.y, p.x, p.y);
                previous = Some(p);
            }
            PathSegment::CurveTo { ctrl1, ctrl2, to } => {
                let (c1, c2, p) = (map.apply(ctrl1), map.apply(ctrl2), map.apply(to));
                pb.cubic_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y);
                previous = Some(p);
            }
            PathSegment::Close => {
                pb.close();
                previous = None;
            }
        }
    }
    if let Some(tail) = open_tail {
        pb.line_to(tail.x, tail.y);
    }
    pb.finish()
}

fn rounded_rect(rect: tiny_skia::Rect, radius: f32) -> Option<Path> {
    let r = radius.min(rect.width() / 2.0).min(rect.height() / 2.0);
    if r <= 0.0 || !r.is_finite() {
        return Some(PathBuilder::from_rect(rect));
    }
    let (l, t, right, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
    let k = r * KAPPA;
    let mut pb = PathBuilder::new();
    pb.move_to(l + r, t);
    pb.line_to(right - r, t);
    pb.cubic_to(right - r + k, t, right, t + r - k, right, t + r);
    pb.line_to(right, b - r);
    pb.cubic_to(right, b - r + k, right - r + k, b, right - r, b);
    pb.line_to(l + r, b);
    pb.cubic_to(l + r - k, b, l, b - r + k, l, b - r);
    pb.line_to(l, t + r);
    pb.cubic_to(l, t + r - k, l + r - k, t, l + r, t);
    pb.close();
    pb.finish()
}

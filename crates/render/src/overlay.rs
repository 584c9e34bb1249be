//! Selection chrome drawn in view space over the composited page

use crate::RenderError;
use pdf_markup_core::{handle_positions, Annotation, CoordinateConverter, EngineConfig, Handle};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, StrokeDash, Transform};

const ACCENT: (u8, u8, u8) = (0, 122, 255);
const HANDLE_RADIUS: f32 = 5.0;

fn accent_paint() -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(ACCENT.0, ACCENT.1, ACCENT.2, 255);
    paint.anti_alias = true;
    paint
}

/// Dashed outline, resize handles and rotation grip for the selected annotation
pub fn paint_selection(
    target: &mut Pixmap,
    annotation: &Annotation,
    converter: &CoordinateConverter,
    config: &EngineConfig,
) -> Result<(), RenderError> {
    let accent = accent_paint();
    let identity = Transform::identity();

    let corners = annotation.rotated_corners().map(|p| converter.point_to_view(p));
    let mut pb = PathBuilder::new();
    pb.move_to(corners[0].x, corners[0].y);
    for corner in &corners[1..] {
        pb.line_to(corner.x, corner.y);
    }
    pb.close();
    let outline = pb.finish().ok_or(RenderError::EmptyPath)?;
    let dashed =
        Stroke { width: 1.5, dash: StrokeDash::new(vec![6.0, 4.0], 0.0), ..Stroke::default() };
    target.stroke_path(&outline, &accent, &dashed, identity, None);

    let handles = handle_positions(annotation, converter, config);
    let top = handles.iter().find(|(h, _)| *h == Handle::Top).map(|(_, p)| *p);
    let grip = handles.iter().find(|(h, _)| *h == Handle::Rotate).map(|(_, p)| *p);

    if let (Some(top), Some(grip)) = (top, grip) {
        let mut pb = PathBuilder::new();
        pb.move_to(top.x, top.y);
        pb.line_to(grip.x, grip.y);
        if let Some(stem) = pb.finish() {
            let thin = Stroke { width: 1.0, ..Stroke::default() };
            target.stroke_path(&stem, &accent, &thin, identity, None);
        }
        if let Some(dot) = PathBuilder::from_circle(grip.x, grip.y, HANDLE_RADIUS) {
            target.fill_path(&dot, &accent, FillRule::Winding, identity, None);
        }
    }

    let mut white = Paint::default();
    white.set_color_rgba8(255, 255, 255, 255);
    white.anti_alias = true;
    let ring = Stroke { width: 1.5, ..Stroke::default() };
    for (_, point) in handles.iter().filter(|(h, _)| h.is_corner()) {
        if let Some(knob) = PathBuilder::from_circle(point.x, point.y, HANDLE_RADIUS) {
            target.fill_path(&knob, &white, FillRule::Winding, identity, None);
            target.stroke_path(&knob, &accent, &ring, identity, None);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_markup_core::{Point, Rect, Tool};

    #[test]
    fn handles_land_on_frame_corners() {
        let media = Rect::new(0.0, 0.0, 200.0, 200.0);
        let converter = CoordinateConverter::for_viewport(media, 1.0, Point::ZERO);
        let ann = Annotation::new(Tool::Rectangle, Rect::new(50.0, 50.0, 100.0, 100.0), 0);
        let mut pixmap = Pixmap::new(200, 200).unwrap();

        paint_selection(&mut pixmap, &ann, &converter, &EngineConfig::default()).unwrap();

        // Corner knob centers are white
        let knob = pixmap.pixel(50, 50).unwrap();
        assert_eq!((knob.red(), knob.green(), knob.blue(), knob.alpha()), (255, 255, 255, 255));
        // Frame interior stays untouched
        assert_eq!(pixmap.pixel(100, 120).unwrap().alpha(), 0);
    }
}

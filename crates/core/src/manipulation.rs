//! Annotation manipulation handles and operations
//!
//! Handles are resolved in view space (touch targets are measured in screen
//! pixels) while every geometric result is computed in page space and
//! mapped through the [`CoordinateConverter`].

use crate::annotation::{normalize_degrees, Annotation, Tool};
use crate::config::EngineConfig;
use crate::geometry::{
    adjust_origin_for_resize, clamp_origin, CoordinateConverter, Point, Rect, Size,
};

/// Interactive region of a selected annotation
///
/// Corner and edge names are as the user sees them on screen; screen "top"
/// is the page-space maximum y edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
    /// Grip above the top edge midpoint
    Rotate,
    /// Anywhere inside the frame
    Move,
}

impl Handle {
    pub const CORNERS: [Handle; 4] =
        [Handle::TopLeft, Handle::TopRight, Handle::BottomLeft, Handle::BottomRight];
    pub const EDGES: [Handle; 4] = [Handle::Top, Handle::Bottom, Handle::Left, Handle::Right];

    pub fn is_corner(self) -> bool {
        Self::CORNERS.contains(&self)
    }

    pub fn is_edge(self) -> bool {
        Self::EDGES.contains(&self)
    }

    /// Which frame edges move: (left, right, bottom, top) in page space
    fn moving_edges(self) -> (bool, bool, bool, bool) {
        match self {
            Handle::TopLeft => (true, false, false, true),
            Handle::TopRight => (false, true, false, true),
            Handle::BottomLeft => (true, false, true, false),
            Handle::BottomRight => (false, true, true, false),
            Handle::Top => (false, false, false, true),
            Handle::Bottom => (false, false, true, false),
            Handle::Left => (true, false, false, false),
            Handle::Right => (false, true, false, false),
            Handle::Rotate | Handle::Move => (false, false, false, false),
        }
    }

    /// Page-space anchor on the unrotated frame that stays fixed while this handle drags
    fn anchor(self, frame: &Rect) -> Point {
        let c = frame.center();
        match self {
            Handle::TopLeft => Point::new(frame.max_x(), frame.min_y()),
            Handle::TopRight => Point::new(frame.min_x(), frame.min_y()),
            Handle::BottomLeft => Point::new(frame.max_x(), frame.max_y()),
            Handle::BottomRight => Point::new(frame.min_x(), frame.max_y()),
            Handle::Top => Point::new(c.x, frame.min_y()),
            Handle::Bottom => Point::new(c.x, frame.max_y()),
            Handle::Left => Point::new(frame.max_x(), c.y),
            Handle::Right => Point::new(frame.min_x(), c.y),
            Handle::Rotate | Handle::Move => c,
        }
    }

    /// Page-space position of the handle on the unrotated frame
    fn position(self, frame: &Rect) -> Point {
        let c = frame.center();
        match self {
            Handle::TopLeft => Point::new(frame.min_x(), frame.max_y()),
            Handle::TopRight => Point::new(frame.max_x(), frame.max_y()),
            Handle::BottomLeft => Point::new(frame.min_x(), frame.min_y()),
            Handle::BottomRight => Point::new(frame.max_x(), frame.min_y()),
            Handle::Top | Handle::Rotate => Point::new(c.x, frame.max_y()),
            Handle::Bottom => Point::new(c.x, frame.min_y()),
            Handle::Left => Point::new(frame.min_x(), c.y),
            Handle::Right => Point::new(frame.max_x(), c.y),
            Handle::Move => c,
        }
    }
}

/// View-space handle positions for a selected annotation
///
/// Returns corners, then edge midpoints, then the rotation grip, which is
/// also the hit-test priority order.
pub fn handle_positions(
    annotation: &Annotation,
    converter: &CoordinateConverter,
    config: &EngineConfig,
) -> Vec<(Handle, Point)> {
    let frame = annotation.frame();
    let center = frame.center();
    let to_view = |handle: Handle| {
        converter.point_to_view(handle.position(&frame).rotated_about(center, annotation.rotation()))
    };

    let mut positions: Vec<(Handle, Point)> = Handle::CORNERS
        .iter()
        .chain(Handle::EDGES.iter())
        .map(|&handle| (handle, to_view(handle)))
        .collect();

    let top = to_view(Handle::Top);
    let center_view = converter.point_to_view(center);
    let (dx, dy) = (top.x - center_view.x, top.y - center_view.y);
    let len = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = if len > f32::EPSILON { (dx / len, dy / len) } else { (0.0, -1.0) };
    positions.push((
        Handle::Rotate,
        top.offset(ux * config.rotation_handle_offset, uy * config.rotation_handle_offset),
    ));
    positions
}

/// Resolve which handle a view-space point grabs
///
/// The first handle within the touch radius wins; otherwise a point inside
/// the rotated frame yields [`Handle::Move`]; otherwise `None`.
pub fn hit_handle(
    annotation: &Annotation,
    view_point: Point,
    converter: &CoordinateConverter,
    config: &EngineConfig,
) -> Option<Handle> {
    let grabbed = handle_positions(annotation, converter, config)
        .into_iter()
        .find(|(_, position)| position.distance_to(&view_point) <= config.touch_radius)
        .map(|(handle, _)| handle);
    if grabbed.is_some() {
        return grabbed;
    }
    annotation.contains(&converter.point_to_page(view_point)).then_some(Handle::Move)
}

/// Clamp each dimension into the configured [min, max] box
pub fn clamp_size(size: Size, config: &EngineConfig) -> Size {
    Size::new(
        size.width.clamp(config.min_size.width, config.max_size.width),
        size.height.clamp(config.min_size.height, config.max_size.height),
    )
}

/// Lay out one axis after a resize: the fixed edge stays, the extent is clamped
fn resize_axis(
    min: f32,
    max: f32,
    moves_min: bool,
    moves_max: bool,
    lo: f32,
    hi: f32,
) -> (f32, f32) {
    if moves_max {
        let extent = (max - min).abs().clamp(lo, hi);
        if max >= min {
            (min, min + extent)
        } else {
            (min - extent, min)
        }
    } else if moves_min {
        let extent = (max - min).abs().clamp(lo, hi);
        if min <= max {
            (max - extent, max)
        } else {
            (max, max + extent)
        }
    } else {
        (min, max)
    }
}

/// Frame produced by dragging `handle` by a page-space delta
///
/// The delta is taken into the annotation's unrotated local frame, the
/// dragged edges move, negative extents flip, and the size is clamped with
/// the opposite side anchored. For rotated annotations the frame is then
/// shifted so the anchor stays at the same place on the page.
pub fn resize_frame(
    handle: Handle,
    start: &Rect,
    rotation: f32,
    delta: (f32, f32),
    config: &EngineConfig,
) -> Rect {
    let (moves_left, moves_right, moves_bottom, moves_top) = handle.moving_edges();
    if !(moves_left || moves_right || moves_bottom || moves_top) {
        return *start;
    }

    let local = Point::new(delta.0, delta.1).rotated_about(Point::ZERO, -rotation);
    let x0 = start.min_x() + if moves_left { local.x } else { 0.0 };
    let x1 = start.max_x() + if moves_right { local.x } else { 0.0 };
    let y0 = start.min_y() + if moves_bottom { local.y } else { 0.0 };
    let y1 = start.max_y() + if moves_top { local.y } else { 0.0 };

    let (x0, x1) = if moves_left || moves_right {
        resize_axis(x0, x1, moves_left, moves_right, config.min_size.width, config.max_size.width)
    } else {
        (x0, x1)
    };
    let (y0, y1) = if moves_bottom || moves_top {
        resize_axis(y0, y1, moves_bottom, moves_top, config.min_size.height, config.max_size.height)
    } else {
        (y0, y1)
    };
    let resized = Rect::from_points(Point::new(x0, y0), Point::new(x1, y1));

    if rotation == 0.0 {
        return resized;
    }
    // Keep the anchor fixed on the page once the new frame is rotated about its own center
    let anchor = handle.anchor(start);
    let before = anchor.rotated_about(start.center(), rotation);
    let after = anchor.rotated_about(resized.center(), rotation);
    resized.translated(before.x - after.x, before.y - after.y)
}

/// Frame translated by a page-space delta and kept inside the page
pub fn move_frame(start: &Rect, delta: (f32, f32), page_bounds: &Rect) -> Rect {
    let origin = clamp_origin(start.origin.offset(delta.0, delta.1), start.size, page_bounds);
    Rect::from_origin_size(origin, start.size)
}

/// Angle in degrees of `point` around `center`, counter-clockwise in page space
fn angle_about(center: Point, point: Point) -> f32 {
    (point.y - center.y).atan2(point.x - center.x).to_degrees()
}

/// Rotation after dragging the rotate grip from `start` to `current` (page space)
pub fn rotation_for_drag(
    center: Point,
    start: Point,
    current: Point,
    start_rotation: f32,
    config: &EngineConfig,
) -> f32 {
    let delta = angle_about(center, current) - angle_about(center, start);
    let rotation = normalize_degrees(start_rotation + delta);
    if config.snap_rotation {
        snap_rotation(rotation, config.snap_increment_degrees, config.snap_threshold_degrees)
    } else {
        rotation
    }
}

/// Snap to the nearest multiple of `increment` when within `threshold`
pub fn snap_rotation(degrees: f32, increment: f32, threshold: f32) -> f32 {
    if increment <= 0.0 {
        return degrees;
    }
    let nearest = (degrees / increment).round() * increment;
    if (degrees - nearest).abs() <= threshold {
        normalize_degrees(nearest)
    } else {
        degrees
    }
}

/// Result of a pinch-scale step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleOutcome {
    pub frame: Rect,
    /// Factor actually applied after clamping
    pub factor: f32,
}

/// Uniformly scale the gesture-start frame about its center
///
/// The factor is clamped to the tool's range and further limited so the
/// frame fits inside the page; the origin is then clamped to the page.
pub fn scale_frame(tool: Tool, start: &Rect, factor: f32, page_bounds: &Rect) -> ScaleOutcome {
    let (lo, hi) = tool.scale_limits();
    let mut factor = if factor.is_finite() { factor.clamp(lo, hi) } else { 1.0 };
    if start.width() > 0.0 {
        factor = factor.min(page_bounds.width() / start.width());
    }
    if start.height() > 0.0 {
        factor = factor.min(page_bounds.height() / start.height());
    }

    let size = start.size.scaled(factor);
    let origin = adjust_origin_for_resize(start.origin, start.size, size);
    let origin = clamp_origin(origin, size, page_bounds);
    ScaleOutcome { frame: Rect::from_origin_size(origin, size), factor }
}

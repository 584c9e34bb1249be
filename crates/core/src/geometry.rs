//! Coordinate conversion between PDF page space and view space
//!
//! PDF page space has its origin at the bottom-left corner of the media box,
//! x grows to the right and y grows upward; units are points (1/72 inch).
//! View space has its origin at the top-left corner of the viewport, y grows
//! downward and units are device pixels at the current zoom.
//!
//! Every component maps between the two through [`CoordinateConverter`];
//! nothing else re-derives the page transform.

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing mapped coordinates
pub const EPSILON: f32 = 1e-4;

/// A point in either page space or view space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    /// Create a new point
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Translate by a delta
    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Rotate about `center` by `degrees` (counter-clockwise in a y-up space)
    pub fn rotated_about(&self, center: Point, degrees: f32) -> Point {
        if degrees == 0.0 {
            return *self;
        }
        let (sin, cos) = degrees.to_radians().sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Point::new(center.x + dx * cos - dy * sin, center.y + dx * sin + dy * cos)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Width and height of a rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn scaled(&self, factor: f32) -> Size {
        Size::new(self.width * factor, self.height * factor)
    }

    pub fn is_finite(&self) -> bool {
        self.width.is_finite() && self.height.is_finite()
    }
}

/// Axis-aligned rectangle
///
/// In page space `origin` is the bottom-left corner; in view space it is
/// the top-left corner. Either way `origin` holds the minimum x and y.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { origin: Point::new(x, y), size: Size::new(width, height) }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    /// Rectangle spanning two arbitrary corner points
    pub fn from_points(a: Point, b: Point) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Rect::new(min_x, min_y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    /// Smallest rectangle containing every point, `None` for an empty iterator
    pub fn envelope<I: IntoIterator<Item = Point>>(points: I) -> Option<Rect> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in iter {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn min_x(&self) -> f32 {
        self.origin.x
    }

    pub fn min_y(&self) -> f32 {
        self.origin.y
    }

    pub fn max_x(&self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f32 {
        self.origin.y + self.size.height
    }

    pub fn width(&self) -> f32 {
        self.size.width
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    pub fn area(&self) -> f32 {
        self.size.width * self.size.height
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    /// Inclusive point containment
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x()
            && point.x <= self.max_x()
            && point.y >= self.min_y()
            && point.y <= self.max_y()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x() <= other.max_x()
            && other.min_x() <= self.max_x()
            && self.min_y() <= other.max_y()
            && other.min_y() <= self.max_y()
    }

    pub fn is_finite(&self) -> bool {
        self.origin.is_finite() && self.size.is_finite()
    }

    /// True when the rectangle has no area or holds NaN/inf
    pub fn is_degenerate(&self) -> bool {
        !self.is_finite() || self.size.width <= 0.0 || self.size.height <= 0.0
    }

    /// Flip negative extents so width and height are non-negative
    pub fn normalized(&self) -> Rect {
        let mut rect = *self;
        if rect.size.width < 0.0 {
            rect.origin.x += rect.size.width;
            rect.size.width = -rect.size.width;
        }
        if rect.size.height < 0.0 {
            rect.origin.y += rect.size.height;
            rect.size.height = -rect.size.height;
        }
        rect
    }

    /// Grow the rectangle by `amount` on every side
    pub fn outset(&self, amount: f32) -> Rect {
        Rect::new(
            self.origin.x - amount,
            self.origin.y - amount,
            self.size.width + amount * 2.0,
            self.size.height + amount * 2.0,
        )
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Rect {
        Rect::from_origin_size(self.origin.offset(dx, dy), self.size)
    }

    /// Corners in order: min/min, max/min, max/max, min/max
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x(), self.min_y()),
            Point::new(self.max_x(), self.min_y()),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.min_x(), self.max_y()),
        ]
    }

    /// Envelope of this rectangle rotated about its own center
    pub fn rotated_bounds(&self, degrees: f32) -> Rect {
        if degrees % 360.0 == 0.0 {
            return *self;
        }
        let center = self.center();
        Rect::envelope(self.corners().iter().map(|c| c.rotated_about(center, degrees)))
            .unwrap_or(*self)
    }
}

/// 2D affine transform using the PDF matrix convention `[a b c d e f]`
///
/// `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 };

    pub fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Counter-clockwise rotation in a y-up space
    pub fn rotate(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Rotation about an arbitrary center
    pub fn rotate_about(center: Point, degrees: f32) -> Self {
        Affine::translate(-center.x, -center.y)
            .then(&Affine::rotate(degrees))
            .then(&Affine::translate(center.x, center.y))
    }

    /// Transform that applies `self` first and `next` second
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            tx: self.tx * next.a + self.ty * next.c + next.tx,
            ty: self.tx * next.b + self.ty * next.d + next.ty,
        }
    }

    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    /// Inverse transform, `None` when the matrix is singular
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f32::EPSILON || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            tx: (self.c * self.ty - self.d * self.tx) * inv,
            ty: (self.b * self.tx - self.a * self.ty) * inv,
        })
    }

    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            self.a * point.x + self.c * point.y + self.tx,
            self.b * point.x + self.d * point.y + self.ty,
        )
    }

    /// Apply only the linear part (no translation)
    pub fn apply_vector(&self, dx: f32, dy: f32) -> (f32, f32) {
        (self.a * dx + self.c * dy, self.b * dx + self.d * dy)
    }

    /// Average of the x and y axis scale factors
    pub fn mean_scale(&self) -> f32 {
        let sx = (self.a * self.a + self.b * self.b).sqrt();
        let sy = (self.c * self.c + self.d * self.d).sqrt();
        (sx + sy) / 2.0
    }

    /// Envelope of a rectangle's mapped corners
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        Rect::envelope(rect.corners().iter().map(|c| self.apply(*c))).unwrap_or_default()
    }
}

/// Maps between one page's PDF space and view space
///
/// Built from the page's media box and the viewer's current page-to-view
/// transform. The inverse is computed once so both directions stay exact
/// inverses of each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateConverter {
    media_box: Rect,
    to_view: Affine,
    to_page: Affine,
}

impl CoordinateConverter {
    /// Create a converter from an arbitrary page-to-view transform
    ///
    /// Returns `None` if the transform is not invertible.
    pub fn new(media_box: Rect, page_to_view: Affine) -> Option<Self> {
        let to_page = page_to_view.inverse()?;
        Some(Self { media_box, to_view: page_to_view, to_page })
    }

    /// Converter for a page shown at `zoom` pixels per point, scrolled so
    /// that view `(0, 0)` sits at `scroll` pixels from the page's top-left
    /// corner. Non-positive zoom falls back to 1.0.
    pub fn for_viewport(media_box: Rect, zoom: f32, scroll: Point) -> Self {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        // y flips: page max_y lands on view row 0
        let to_view = Affine::new(
            zoom,
            0.0,
            0.0,
            -zoom,
            -media_box.min_x() * zoom - scroll.x,
            media_box.max_y() * zoom - scroll.y,
        );
        let to_page = Affine::new(
            1.0 / zoom,
            0.0,
            0.0,
            -1.0 / zoom,
            media_box.min_x() + scroll.x / zoom,
            media_box.max_y() - scroll.y / zoom,
        );
        Self { media_box, to_view, to_page }
    }

    /// Same as [`for_viewport`](Self::for_viewport) with an extra clockwise
    /// display rotation of the page (multiples of 90 degrees)
    pub fn for_rotated_viewport(
        media_box: Rect,
        zoom: f32,
        scroll: Point,
        page_rotation: u16,
    ) -> Self {
        let base = Self::for_viewport(media_box, zoom, scroll);
        let quarter_turns = (page_rotation / 90) % 4;
        if quarter_turns == 0 {
            return base;
        }
        let view_bounds = base.to_view.map_rect(&media_box);
        let pivot = view_bounds.origin;
        // A positive angle in y-down view space turns the page clockwise on screen
        let spin = Affine::rotate_about(pivot, 90.0 * quarter_turns as f32);
        let rotated = base.to_view.then(&spin);
        let rotated_bounds = rotated.map_rect(&media_box);
        let realign =
            Affine::translate(pivot.x - rotated_bounds.min_x(), pivot.y - rotated_bounds.min_y());
        let to_view = rotated.then(&realign);
        Self::new(media_box, to_view).unwrap_or(base)
    }

    pub fn media_box(&self) -> Rect {
        self.media_box
    }

    pub fn page_to_view(&self) -> Affine {
        self.to_view
    }

    pub fn view_to_page(&self) -> Affine {
        self.to_page
    }

    pub fn point_to_view(&self, point: Point) -> Point {
        self.to_view.apply(point)
    }

    pub fn point_to_page(&self, point: Point) -> Point {
        self.to_page.apply(point)
    }

    /// Map a page-space rectangle into view space
    pub fn pdf_to_screen(&self, rect: &Rect) -> Rect {
        self.to_view.map_rect(rect)
    }

    /// Map a view-space rectangle into page space
    pub fn screen_to_pdf(&self, rect: &Rect) -> Rect {
        self.to_page.map_rect(rect)
    }

    /// Convert a view-space distance into page units
    pub fn length_to_page(&self, length: f32) -> f32 {
        length * self.to_page.mean_scale()
    }

    /// Convert a page-space distance into view pixels
    pub fn length_to_view(&self, length: f32) -> f32 {
        length * self.to_view.mean_scale()
    }

    /// Convert a view-space drag delta into a page-space delta
    pub fn delta_to_page(&self, dx: f32, dy: f32) -> (f32, f32) {
        self.to_page.apply_vector(dx, dy)
    }
}

/// Adjust a proposed origin so a rectangle of `size` stays inside `bounds`
///
/// When the size exceeds the bounds on an axis, the rectangle is aligned to
/// the bounds' minimum on that axis.
pub fn clamp_origin(origin: Point, size: Size, bounds: &Rect) -> Point {
    fn axis(value: f32, extent: f32, min: f32, max: f32) -> f32 {
        if extent >= max - min {
            min
        } else {
            value.clamp(min, max - extent)
        }
    }
    Point::new(
        axis(origin.x, size.width, bounds.min_x(), bounds.max_x()),
        axis(origin.y, size.height, bounds.min_y(), bounds.max_y()),
    )
}

/// Origin that keeps the rectangle's center fixed across a size change
pub fn adjust_origin_for_resize(origin: Point, old_size: Size, new_size: Size) -> Point {
    Point::new(
        origin.x + (old_size.width - new_size.width) / 2.0,
        origin.y + (old_size.height - new_size.height) / 2.0,
    )
}

/// Corners as the user sees them on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub fn opposite(self) -> Corner {
        match self {
            Corner::TopLeft => Corner::BottomRight,
            Corner::TopRight => Corner::BottomLeft,
            Corner::BottomLeft => Corner::TopRight,
            Corner::BottomRight => Corner::TopLeft,
        }
    }
}

/// Origin (page space, bottom-left) that keeps the corner opposite the
/// dragged `corner` fixed across a size change
///
/// Screen "top" is page-space max y, so dragging a screen-top corner keeps
/// the page-space bottom edge in place and vice versa.
pub fn adjust_origin_for_corner_resize(
    corner: Corner,
    origin: Point,
    old_size: Size,
    new_size: Size,
) -> Point {
    let dw = old_size.width - new_size.width;
    let dh = old_size.height - new_size.height;
    match corner {
        Corner::TopLeft => Point::new(origin.x + dw, origin.y),
        Corner::TopRight => origin,
        Corner::BottomLeft => Point::new(origin.x + dw, origin.y + dh),
        Corner::BottomRight => Point::new(origin.x, origin.y + dh),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn letter() -> Rect {
        Rect::new(0.0, 0.0, 612.0, 792.0)
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-3 * (1.0 + a.abs().max(b.abs()))
    }

    fn rect_approx(a: &Rect, b: &Rect) -> bool {
        approx(a.min_x(), b.min_x())
            && approx(a.min_y(), b.min_y())
            && approx(a.width(), b.width())
            && approx(a.height(), b.height())
    }

    #[test]
    fn test_viewport_flips_y_axis() {
        let converter = CoordinateConverter::for_viewport(letter(), 1.0, Point::ZERO);
        // Page top-left maps to view origin
        let top_left = converter.point_to_view(Point::new(0.0, 792.0));
        assert!(approx(top_left.x, 0.0) && approx(top_left.y, 0.0));
        // Page origin maps to bottom of the view
        let bottom_left = converter.point_to_view(Point::new(0.0, 0.0));
        assert!(approx(bottom_left.y, 792.0));
    }

    #[test]
    fn test_viewport_zoom_and_scroll() {
        let converter = CoordinateConverter::for_viewport(letter(), 2.0, Point::new(10.0, 20.0));
        let view = converter.pdf_to_screen(&Rect::new(100.0, 700.0, 50.0, 20.0));
        assert!(approx(view.min_x(), 190.0));
        // top edge (y=720) -> (792-720)*2 - 20 = 124
        assert!(approx(view.min_y(), 124.0));
        assert!(approx(view.width(), 100.0));
        assert!(approx(view.height(), 40.0));
    }

    #[test]
    fn test_non_positive_zoom_falls_back() {
        let converter = CoordinateConverter::for_viewport(letter(), 0.0, Point::ZERO);
        assert!(approx(converter.length_to_view(10.0), 10.0));
    }

    #[test]
    fn test_rotated_viewport_is_invertible() {
        let converter =
            CoordinateConverter::for_rotated_viewport(letter(), 1.5, Point::new(3.0, 4.0), 90);
        let rect = Rect::new(50.0, 60.0, 70.0, 80.0);
        let back = converter.screen_to_pdf(&converter.pdf_to_screen(&rect));
        assert!(rect_approx(&rect, &back));
        // Quarter turn swaps the displayed extents
        let view = converter.pdf_to_screen(&rect);
        assert!(approx(view.width(), 80.0 * 1.5));
        assert!(approx(view.height(), 70.0 * 1.5));
    }

    #[test]
    fn test_affine_inverse() {
        let t = Affine::rotate(30.0).then(&Affine::scale(2.0, 3.0)).then(&Affine::translate(5.0, 7.0));
        let inv = t.inverse().unwrap();
        let p = Point::new(11.0, -4.0);
        let back = inv.apply(t.apply(p));
        assert!(approx(back.x, p.x) && approx(back.y, p.y));
        assert!(Affine::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_clamp_origin_inside_bounds() {
        let bounds = letter();
        let clamped = clamp_origin(Point::new(600.0, -5.0), Size::new(50.0, 50.0), &bounds);
        assert_eq!(clamped, Point::new(562.0, 0.0));
    }

    #[test]
    fn test_clamp_origin_oversized() {
        let bounds = Rect::new(10.0, 10.0, 100.0, 100.0);
        let clamped = clamp_origin(Point::new(50.0, 50.0), Size::new(300.0, 20.0), &bounds);
        assert_eq!(clamped, Point::new(10.0, 50.0));
    }

    #[test]
    fn test_adjust_origin_keeps_center() {
        let origin = Point::new(10.0, 10.0);
        let new_origin =
            adjust_origin_for_resize(origin, Size::new(100.0, 50.0), Size::new(50.0, 100.0));
        let old_center = Rect::from_origin_size(origin, Size::new(100.0, 50.0)).center();
        let new_center = Rect::from_origin_size(new_origin, Size::new(50.0, 100.0)).center();
        assert_eq!(old_center, new_center);
    }

    #[test]
    fn test_corner_resize_keeps_opposite_corner() {
        let origin = Point::new(100.0, 100.0);
        let old = Size::new(100.0, 100.0);
        let new = Size::new(60.0, 40.0);

        // Dragging the screen top-left keeps page-space (max_x, min_y)
        let o = adjust_origin_for_corner_resize(Corner::TopLeft, origin, old, new);
        assert_eq!(o.x + new.width, 200.0);
        assert_eq!(o.y, 100.0);

        // Dragging the screen bottom-right keeps page-space (min_x, max_y)
        let o = adjust_origin_for_corner_resize(Corner::BottomRight, origin, old, new);
        assert_eq!(o.x, 100.0);
        assert_eq!(o.y + new.height, 200.0);

        let o = adjust_origin_for_corner_resize(Corner::BottomLeft, origin, old, new);
        assert_eq!((o.x + new.width, o.y + new.height), (200.0, 200.0));

        let o = adjust_origin_for_corner_resize(Corner::TopRight, origin, old, new);
        assert_eq!(o, origin);
    }

    #[test]
    fn test_rotated_bounds_quarter_turn() {
        let rect = Rect::new(0.0, 0.0, 100.0, 20.0);
        let bounds = rect.rotated_bounds(90.0);
        assert!(approx(bounds.width(), 20.0));
        assert!(approx(bounds.height(), 100.0));
        assert!(approx(bounds.center().x, 50.0));
    }

    #[test]
    fn test_normalized_flips_negative_size() {
        let rect = Rect::new(10.0, 10.0, -4.0, -6.0).normalized();
        assert_eq!(rect, Rect::new(6.0, 4.0, 4.0, 6.0));
    }

    proptest! {
        #[test]
        fn prop_round_trip_rect(
            x in -500.0f32..1000.0,
            y in -500.0f32..1000.0,
            w in 0.0f32..800.0,
            h in 0.0f32..800.0,
            zoom in 0.1f32..8.0,
            sx in -2000.0f32..2000.0,
            sy in -2000.0f32..2000.0,
        ) {
            let converter = CoordinateConverter::for_viewport(letter(), zoom, Point::new(sx, sy));
            let rect = Rect::new(x, y, w, h);
            let back = converter.screen_to_pdf(&converter.pdf_to_screen(&rect));
            prop_assert!(rect_approx(&rect, &back), "{:?} != {:?}", rect, back);
        }

        #[test]
        fn prop_general_affine_round_trip(
            angle in -180.0f32..180.0,
            scale in 0.2f32..5.0,
            tx in -300.0f32..300.0,
            ty in -300.0f32..300.0,
            px in -500.0f32..500.0,
            py in -500.0f32..500.0,
        ) {
            let transform = Affine::scale(scale, -scale)
                .then(&Affine::rotate(angle))
                .then(&Affine::translate(tx, ty));
            let converter = CoordinateConverter::new(letter(), transform).unwrap();
            let p = Point::new(px, py);
            let back = converter.point_to_page(converter.point_to_view(p));
            prop_assert!(approx(back.x, p.x) && approx(back.y, p.y));
        }
    }
}

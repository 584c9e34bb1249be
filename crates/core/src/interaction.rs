//! Pointer and pinch interaction state machine
//!
//! Translates view-space pointer events into store mutations. Every
//! move/resize/rotate/scale gesture snapshots the annotation when it begins
//! and records a single Modify action when it ends, so one drag is one undo
//! step. Drawing tools create their annotation on pointer down and extend it
//! in place without recording further history.

use crate::annotation::{Annotation, AnnotationId, PathSegment, Snapshot, Tool};
use crate::config::EngineConfig;
use crate::geometry::{clamp_origin, CoordinateConverter, Point, Rect, Size};
use crate::manipulation::{
    clamp_size, hit_handle, move_frame, resize_frame, rotation_for_drag, scale_frame, Handle,
};
use crate::session::SessionSettings;
use crate::simplify::simplify_path;
use crate::store::{AnnotationStore, StoreError, StoreResult};

/// Observable interaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Moving,
    Resizing(Handle),
    Rotating,
    Scaling,
    Drawing,
    Erasing,
}

/// The page a gesture happens on and its current page-to-view mapping
#[derive(Debug, Clone, Copy)]
pub struct PageView {
    pub page_index: u32,
    pub converter: CoordinateConverter,
}

impl PageView {
    pub fn new(page_index: u32, converter: CoordinateConverter) -> Self {
        Self { page_index, converter }
    }

    fn bounds(&self) -> Rect {
        self.converter.media_box()
    }
}

#[derive(Debug, Clone, Copy)]
enum TransformKind {
    Move,
    Resize(Handle),
    Rotate,
}

#[derive(Debug, Clone)]
enum Gesture {
    Idle,
    Transform {
        kind: TransformKind,
        id: AnnotationId,
        before: Snapshot,
        start_view: Point,
        start_page: Point,
    },
    Scaling {
        id: AnnotationId,
        before: Snapshot,
    },
    Freehand {
        id: AnnotationId,
        /// Running envelope of every sampled point
        bounds: Rect,
    },
    Shape {
        id: AnnotationId,
        tool: Tool,
        anchor: Point,
    },
    Erasing,
}

/// Grow a rectangle about its center so neither side is shorter than `min`
fn with_min_extent(rect: Rect, min: f32) -> Rect {
    let center = rect.center();
    let width = rect.width().max(min);
    let height = rect.height().max(min);
    Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
}

fn union_point(rect: Rect, p: Point) -> Rect {
    Rect::from_points(
        Point::new(rect.min_x().min(p.x), rect.min_y().min(p.y)),
        Point::new(rect.max_x().max(p.x), rect.max_y().max(p.y)),
    )
}

/// Isosceles triangle inscribed in `frame`, apex at the top center
fn inscribed_triangle(frame: &Rect) -> Vec<PathSegment> {
    vec![
        PathSegment::MoveTo { to: Point::new(frame.center().x, frame.max_y()) },
        PathSegment::LineTo { to: Point::new(frame.max_x(), frame.min_y()) },
        PathSegment::LineTo { to: Point::new(frame.min_x(), frame.min_y()) },
        PathSegment::Close,
    ]
}

/// Drives one page's pointer and pinch gestures against a store
#[derive(Debug)]
pub struct InteractionController {
    config: EngineConfig,
    gesture: Gesture,
}

impl InteractionController {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, gesture: Gesture::Idle }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> InteractionState {
        match &self.gesture {
            Gesture::Idle => InteractionState::Idle,
            Gesture::Transform { kind: TransformKind::Move, .. } => InteractionState::Moving,
            Gesture::Transform { kind: TransformKind::Resize(handle), .. } => {
                InteractionState::Resizing(*handle)
            }
            Gesture::Transform { kind: TransformKind::Rotate, .. } => InteractionState::Rotating,
            Gesture::Scaling { .. } => InteractionState::Scaling,
            Gesture::Freehand { .. } | Gesture::Shape { .. } => InteractionState::Drawing,
            Gesture::Erasing => InteractionState::Erasing,
        }
    }

    /// Annotation currently being drawn or transformed
    pub fn active_annotation(&self) -> Option<AnnotationId> {
        match &self.gesture {
            Gesture::Transform { id, .. }
            | Gesture::Scaling { id, .. }
            | Gesture::Freehand { id, .. }
            | Gesture::Shape { id, .. } => Some(*id),
            Gesture::Idle | Gesture::Erasing => None,
        }
    }

    fn abandon(&mut self, err: impl std::fmt::Display) {
        tracing::warn!(%err, "gesture target disappeared, returning to idle");
        self.gesture = Gesture::Idle;
    }

    /// Start a gesture at a view-space point
    pub fn pointer_down(
        &mut self,
        store: &mut AnnotationStore,
        settings: &SessionSettings,
        view: &PageView,
        point: Point,
    ) -> InteractionState {
        if !matches!(self.gesture, Gesture::Idle) {
            self.pointer_up(store, view);
        }
        let page_point = view.converter.point_to_page(point);
        let tool = settings.tool();

        let result = match tool {
            Tool::Selection => self.begin_selection(store, view, point, page_point),
            Tool::Eraser => {
                self.gesture = Gesture::Erasing;
                Self::erase_at(store, view, page_point)
            }
            Tool::Pen | Tool::Highlighter => {
                self.begin_freehand(store, settings, tool, view, page_point);
                Ok(())
            }
            Tool::Rectangle
            | Tool::Oval
            | Tool::Line
            | Tool::Arrow
            | Tool::Polygon
            | Tool::Magnifier => {
                self.begin_shape(store, settings, tool, view, page_point);
                Ok(())
            }
            Tool::Text | Tool::Note | Tool::Signature => {
                self.place(store, settings, tool, view, page_point)
            }
        };
        if let Err(err) = result {
            self.abandon(err);
        }
        self.state()
    }

    fn begin_selection(
        &mut self,
        store: &mut AnnotationStore,
        view: &PageView,
        point: Point,
        page_point: Point,
    ) -> StoreResult<()> {
        let on_page = store.selected().filter(|a| a.page_index() == view.page_index);
        if let Some(selected) = on_page {
            let id = selected.id();
            let kind = match hit_handle(selected, point, &view.converter, &self.config) {
                Some(Handle::Move) => Some(TransformKind::Move),
                Some(Handle::Rotate) => Some(TransformKind::Rotate),
                Some(handle) => Some(TransformKind::Resize(handle)),
                None => None,
            };
            if let Some(kind) = kind {
                return self.begin_transform(store, kind, id, point, page_point);
            }
        }

        match store.hit_test(&page_point, view.page_index).map(|a| a.id()) {
            Some(id) => {
                store.select(Some(id))?;
                self.begin_transform(store, TransformKind::Move, id, point, page_point)
            }
            None => {
                store.deselect();
                self.gesture = Gesture::Idle;
                Ok(())
            }
        }
    }

    fn begin_transform(
        &mut self,
        store: &mut AnnotationStore,
        kind: TransformKind,
        id: AnnotationId,
        start_view: Point,
        start_page: Point,
    ) -> StoreResult<()> {
        store.update(id, |a| a.set_dragging(true))?;
        let before = store.get(id).map(|a| a.snapshot()).ok_or(StoreError::NotFound(id))?;
        tracing::debug!(%id, ?kind, "transform gesture started");
        self.gesture = Gesture::Transform { kind, id, before, start_view, start_page };
        Ok(())
    }

    fn begin_freehand(
        &mut self,
        store: &mut AnnotationStore,
        settings: &SessionSettings,
        tool: Tool,
        view: &PageView,
        p: Point,
    ) {
        let mut properties = settings.properties_for(tool);
        properties.path = vec![PathSegment::MoveTo { to: p }];
        let frame = Rect::new(p.x, p.y, 1.0, 1.0);
        let annotation = Annotation::with_properties(tool, frame, view.page_index, properties);
        let id = store.add(annotation);
        self.gesture = Gesture::Freehand { id, bounds: Rect::new(p.x, p.y, 0.0, 0.0) };
    }

    fn begin_shape(
        &mut self,
        store: &mut AnnotationStore,
        settings: &SessionSettings,
        tool: Tool,
        view: &PageView,
        p: Point,
    ) {
        let mut properties = settings.properties_for(tool);
        if matches!(tool, Tool::Line | Tool::Arrow) {
            properties.path = vec![PathSegment::MoveTo { to: p }, PathSegment::LineTo { to: p }];
        }
        let frame = Rect::new(p.x, p.y, 1.0, 1.0);
        let annotation = Annotation::with_properties(tool, frame, view.page_index, properties);
        let id = store.add(annotation);
        self.gesture = Gesture::Shape { id, tool, anchor: p };
    }

    /// Tap placement for text boxes, notes and signatures
    fn place(
        &mut self,
        store: &mut AnnotationStore,
        settings: &SessionSettings,
        tool: Tool,
        view: &PageView,
        p: Point,
    ) -> StoreResult<()> {
        let properties = settings.properties_for(tool);
        let size: Size = match tool {
            Tool::Text => self.config.text_size,
            Tool::Note => self.config.note_size,
            _ => self.config.signature_size,
        };
        if tool == Tool::Signature && properties.signature.is_none() {
            tracing::debug!("signature tool used without a signature image");
            return Ok(());
        }
        let origin = Point::new(p.x - size.width / 2.0, p.y - size.height / 2.0);
        let origin = clamp_origin(origin, size, &view.bounds());
        let frame = Rect::from_origin_size(origin, size);
        let annotation = Annotation::with_properties(tool, frame, view.page_index, properties);
        let id = store.add(annotation);
        store.select(Some(id))?;
        if tool == Tool::Text {
            store.update(id, |a| a.set_editing(true))?;
        }
        self.gesture = Gesture::Idle;
        Ok(())
    }

    fn erase_at(store: &mut AnnotationStore, view: &PageView, p: Point) -> StoreResult<()> {
        if let Some(id) = store.hit_test(&p, view.page_index).map(|a| a.id()) {
            tracing::debug!(%id, "erasing annotation");
            store.remove(id)?;
        }
        Ok(())
    }

    /// Continue the active gesture; returns true when the page needs a redraw
    pub fn pointer_move(&mut self, store: &mut AnnotationStore, view: &PageView, point: Point) -> bool {
        let page_point = view.converter.point_to_page(point);
        let result = match &mut self.gesture {
            Gesture::Idle | Gesture::Scaling { .. } => return false,
            Gesture::Erasing => Self::erase_at(store, view, page_point).map(|_| true),
            Gesture::Transform { kind, id, before, start_view, start_page } => {
                let delta = view.converter.delta_to_page(point.x - start_view.x, point.y - start_view.y);
                let id = *id;
                match *kind {
                    TransformKind::Move => {
                        let frame = move_frame(&before.frame, delta, &view.bounds());
                        store.update(id, |a| a.set_frame(frame))
                    }
                    TransformKind::Resize(handle) => {
                        let frame = resize_frame(handle, &before.frame, before.rotation, delta, &self.config);
                        store.update(id, |a| a.set_frame(frame))
                    }
                    TransformKind::Rotate => {
                        let rotation = rotation_for_drag(
                            before.frame.center(),
                            *start_page,
                            page_point,
                            before.rotation,
                            &self.config,
                        );
                        store.update(id, |a| a.set_rotation(rotation))
                    }
                }
                .map(|_| true)
            }
            Gesture::Freehand { id, bounds } => {
                *bounds = union_point(*bounds, page_point);
                let frame = with_min_extent(*bounds, 1.0);
                store
                    .update(*id, |a| {
                        a.properties_mut().path.push(PathSegment::LineTo { to: page_point });
                        a.set_frame(frame);
                    })
                    .map(|_| true)
            }
            Gesture::Shape { id, tool, anchor } => {
                let (id, tool, anchor) = (*id, *tool, *anchor);
                let dragged = Rect::from_points(anchor, page_point);
                if matches!(tool, Tool::Line | Tool::Arrow) {
                    store.update(id, |a| {
                        let thickness = a.properties().stroke_width.max(1.0);
                        a.properties_mut().path = vec![
                            PathSegment::MoveTo { to: anchor },
                            PathSegment::LineTo { to: page_point },
                        ];
                        a.set_frame(with_min_extent(dragged, thickness));
                    })
                } else {
                    store.update(id, |a| a.set_frame(dragged))
                }
                .map(|_| true)
            }
        };
        match result {
            Ok(redraw) => redraw,
            Err(err) => {
                self.abandon(err);
                false
            }
        }
    }

    /// Finish the active gesture
    pub fn pointer_up(&mut self, store: &mut AnnotationStore, view: &PageView) -> InteractionState {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        let result = match gesture {
            Gesture::Idle | Gesture::Erasing | Gesture::Scaling { .. } => Ok(()),
            Gesture::Transform { id, before, .. } => store
                .update(id, |a| a.set_dragging(false))
                .and_then(|_| store.commit_modify(id, before)),
            Gesture::Freehand { id, .. } => self.finish_freehand(store, id),
            Gesture::Shape { id, tool, .. } => self.finish_shape(store, view, id, tool),
        };
        if let Err(err) = result {
            self.abandon(err);
        }
        self.state()
    }

    fn finish_freehand(&self, store: &mut AnnotationStore, id: AnnotationId) -> StoreResult<()> {
        let tolerance = self.config.simplify_tolerance;
        store.update(id, |a| {
            let path = simplify_path(&a.properties().path, tolerance);
            if let Some(bounds) = crate::annotation::path_bounds(&path) {
                a.set_frame(with_min_extent(bounds, 1.0));
            }
            tracing::trace!(before = a.properties().path_len(), after = path.len(), "stroke simplified");
            a.properties_mut().path = path;
        })
    }

    fn finish_shape(
        &self,
        store: &mut AnnotationStore,
        view: &PageView,
        id: AnnotationId,
        tool: Tool,
    ) -> StoreResult<()> {
        let min_length = self.config.min_size.width;
        store.update(id, |a| {
            let frame = a.frame();
            match tool {
                Tool::Line | Tool::Arrow => {
                    let (start, end) = match a.properties().path.as_slice() {
                        [PathSegment::MoveTo { to: s }, PathSegment::LineTo { to: e }] => (*s, *e),
                        _ => return,
                    };
                    if start.distance_to(&end) < 1.0 {
                        // A tap draws a default-length horizontal line
                        let end = Point::new(start.x + min_length, start.y);
                        let thickness = a.properties().stroke_width.max(1.0);
                        a.properties_mut().path =
                            vec![PathSegment::MoveTo { to: start }, PathSegment::LineTo { to: end }];
                        a.set_frame(with_min_extent(Rect::from_points(start, end), thickness));
                    }
                }
                _ => {
                    let size = clamp_size(frame.size, &self.config);
                    let origin = clamp_origin(frame.origin, size, &view.bounds());
                    let frame = Rect::from_origin_size(origin, size);
                    a.set_frame(frame);
                    if tool == Tool::Polygon {
                        a.properties_mut().path = inscribed_triangle(&frame);
                    }
                }
            }
        })
    }

    /// Begin scaling the selected annotation; false when nothing is selected
    pub fn pinch_begin(&mut self, store: &AnnotationStore) -> bool {
        let Some(selected) = store.selected() else {
            return false;
        };
        self.gesture = Gesture::Scaling { id: selected.id(), before: selected.snapshot() };
        true
    }

    /// Apply a pinch scale factor relative to the gesture start
    pub fn pinch_update(&mut self, store: &mut AnnotationStore, view: &PageView, scale: f32) -> bool {
        let (id, start_frame, start_font) = match &self.gesture {
            Gesture::Scaling { id, before } => (*id, before.frame, before.properties.font_size),
            _ => return false,
        };
        let Some(tool) = store.get(id).map(|a| a.tool()) else {
            self.abandon(StoreError::NotFound(id));
            return false;
        };
        let outcome = scale_frame(tool, &start_frame, scale, &view.bounds());
        let result = store.update(id, |a| {
            a.set_frame(outcome.frame);
            if matches!(tool, Tool::Text) {
                a.properties_mut().font_size = start_font * outcome.factor;
            }
        });
        match result {
            Ok(()) => true,
            Err(err) => {
                self.abandon(err);
                false
            }
        }
    }

    /// Finish scaling, recording one Modify action
    pub fn pinch_end(&mut self, store: &mut AnnotationStore) {
        if let Gesture::Scaling { id, before } = std::mem::replace(&mut self.gesture, Gesture::Idle) {
            if let Err(err) = store.commit_modify(id, before) {
                self.abandon(err);
            }
        }
    }

    /// Abort the active gesture
    ///
    /// Transforms and scaling snap back to the gesture-start snapshot without
    /// recording history. Drawing gestures are finished as if released.
    pub fn cancel(&mut self, store: &mut AnnotationStore, view: &PageView) {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Transform { id, before, .. } | Gesture::Scaling { id, before } => {
                let result = store.update(id, |a| {
                    a.restore(&before);
                    a.set_dragging(false);
                });
                if let Err(err) = result {
                    self.abandon(err);
                }
            }
            gesture @ (Gesture::Freehand { .. } | Gesture::Shape { .. }) => {
                self.gesture = gesture;
                self.pointer_up(store, view);
            }
            Gesture::Idle | Gesture::Erasing => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AnnotationStore, SessionSettings, PageView, InteractionController) {
        let converter =
            CoordinateConverter::for_viewport(Rect::new(0.0, 0.0, 612.0, 792.0), 1.0, Point::ZERO);
        (
            AnnotationStore::default(),
            SessionSettings::default(),
            PageView::new(0, converter),
            InteractionController::new(EngineConfig::default()),
        )
    }

    /// View point for a page point at zoom 1 on a Letter page
    fn v(x: f32, y: f32) -> Point {
        Point::new(x, 792.0 - y)
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_tap_selects_and_drag_moves() {
        let (mut store, settings, view, mut ctl) = setup();
        let id = store.add(Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 100.0), 0));
        let undo_before = store.history().undo_len();

        assert_eq!(ctl.pointer_down(&mut store, &settings, &view, v(150.0, 150.0)), InteractionState::Moving);
        assert_eq!(store.selected_id(), Some(id));
        assert!(store.get(id).unwrap().is_dragging());

        for step in 1..=10 {
            ctl.pointer_move(&mut store, &view, v(150.0 + step as f32 * 2.0, 150.0 + step as f32));
        }
        assert_eq!(ctl.pointer_up(&mut store, &view), InteractionState::Idle);

        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.frame(), Rect::new(120.0, 110.0, 100.0, 100.0));
        assert!(!annotation.is_dragging());
        assert_eq!(store.history().undo_len(), undo_before + 1);

        store.undo();
        assert_eq!(store.get(id).unwrap().frame(), Rect::new(100.0, 100.0, 100.0, 100.0));
    }

    #[test]
    fn test_tap_without_drag_records_nothing() {
        let (mut store, settings, view, mut ctl) = setup();
        store.add(Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 100.0), 0));
        let undo_before = store.history().undo_len();
        ctl.pointer_down(&mut store, &settings, &view, v(150.0, 150.0));
        ctl.pointer_up(&mut store, &view);
        assert_eq!(store.history().undo_len(), undo_before);
    }

    #[test]
    fn test_tap_on_empty_space_deselects() {
        let (mut store, settings, view, mut ctl) = setup();
        let id = store.add(Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 100.0), 0));
        store.select(Some(id)).unwrap();
        assert_eq!(ctl.pointer_down(&mut store, &settings, &view, v(500.0, 700.0)), InteractionState::Idle);
        assert!(store.selected().is_none());
    }

    #[test]
    fn test_corner_handle_resizes() {
        let (mut store, settings, view, mut ctl) = setup();
        let id = store.add(Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 100.0), 0));
        store.select(Some(id)).unwrap();

        // Bottom-right corner sits at page (200, 100)
        let state = ctl.pointer_down(&mut store, &settings, &view, v(200.0, 100.0));
        assert_eq!(state, InteractionState::Resizing(Handle::BottomRight));
        ctl.pointer_move(&mut store, &view, v(250.0, 80.0));
        ctl.pointer_up(&mut store, &view);

        assert_eq!(store.get(id).unwrap().frame(), Rect::new(100.0, 80.0, 150.0, 120.0));
    }

    #[test]
    fn test_rotation_handle_rotates() {
        let (mut store, settings, view, mut ctl) = setup();
        let ctl_config = ctl.config().clone();
        let id = store.add(Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 100.0), 0));
        store.select(Some(id)).unwrap();

        // Grip is 30px above the top-center (150, 200) in view space
        let grip = Point::new(150.0, 792.0 - 200.0 - ctl_config.rotation_handle_offset);
        assert_eq!(ctl.pointer_down(&mut store, &settings, &view, grip), InteractionState::Rotating);
        // Drag to the left of the center: a quarter turn counter-clockwise
        ctl.pointer_move(&mut store, &view, v(50.0, 150.0));
        ctl.pointer_up(&mut store, &view);
        assert!(approx(store.get(id).unwrap().rotation(), 90.0));
    }

    #[test]
    fn test_pen_stroke_is_one_add_action() {
        let (mut store, mut settings, view, mut ctl) = setup();
        settings.select_tool(Tool::Pen);

        assert_eq!(ctl.pointer_down(&mut store, &settings, &view, v(10.0, 10.0)), InteractionState::Drawing);
        let id = ctl.active_annotation().unwrap();
        assert_eq!(store.get(id).unwrap().frame(), Rect::new(10.0, 10.0, 1.0, 1.0));

        for i in 1..=20 {
            ctl.pointer_move(&mut store, &view, v(10.0 + i as f32 * 5.0, 10.0 + (i % 2) as f32 * 30.0));
        }
        assert_eq!(store.get(id).unwrap().properties().path_len(), 21);
        assert_eq!(ctl.pointer_up(&mut store, &view), InteractionState::Idle);

        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.frame(), Rect::new(10.0, 10.0, 100.0, 30.0));
        assert!(store.selected().is_none());
        assert_eq!(store.history().undo_len(), 1);

        store.undo();
        assert!(store.is_empty());
        store.redo();
        assert_eq!(store.get(id).unwrap().frame(), Rect::new(10.0, 10.0, 100.0, 30.0));
    }

    #[test]
    fn test_straight_stroke_is_simplified() {
        let (mut store, mut settings, view, mut ctl) = setup();
        settings.select_tool(Tool::Highlighter);
        ctl.pointer_down(&mut store, &settings, &view, v(0.0, 300.0));
        for i in 1..=50 {
            ctl.pointer_move(&mut store, &view, v(i as f32 * 4.0, 300.0));
        }
        let id = ctl.active_annotation().unwrap();
        ctl.pointer_up(&mut store, &view);

        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.properties().path_len(), 2);
        assert!(annotation.validate().is_ok());
        assert_eq!(annotation.frame().height(), 1.0);
    }

    #[test]
    fn test_drawing_tool_bypasses_selection() {
        let (mut store, mut settings, view, mut ctl) = setup();
        store.add(Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 100.0), 0));
        settings.select_tool(Tool::Pen);
        ctl.pointer_down(&mut store, &settings, &view, v(150.0, 150.0));
        ctl.pointer_up(&mut store, &view);
        assert_eq!(store.len(), 2);
        assert!(store.selected().is_none());
    }

    #[test]
    fn test_rectangle_drag_and_min_size() {
        let (mut store, mut settings, view, mut ctl) = setup();
        settings.select_tool(Tool::Rectangle);
        ctl.pointer_down(&mut store, &settings, &view, v(300.0, 300.0));
        ctl.pointer_move(&mut store, &view, v(200.0, 350.0));
        let id = ctl.active_annotation().unwrap();
        ctl.pointer_up(&mut store, &view);
        assert_eq!(store.get(id).unwrap().frame(), Rect::new(200.0, 300.0, 100.0, 50.0));

        // A tap grows to the minimum size
        ctl.pointer_down(&mut store, &settings, &view, v(10.0, 10.0));
        let id = ctl.active_annotation().unwrap();
        ctl.pointer_up(&mut store, &view);
        assert_eq!(store.get(id).unwrap().frame().size, Size::new(20.0, 20.0));
    }

    #[test]
    fn test_arrow_keeps_direction() {
        let (mut store, mut settings, view, mut ctl) = setup();
        settings.select_tool(Tool::Arrow);
        ctl.pointer_down(&mut store, &settings, &view, v(300.0, 300.0));
        ctl.pointer_move(&mut store, &view, v(100.0, 300.0));
        let id = ctl.active_annotation().unwrap();
        ctl.pointer_up(&mut store, &view);

        let annotation = store.get(id).unwrap();
        assert_eq!(
            annotation.properties().path,
            vec![
                PathSegment::MoveTo { to: Point::new(300.0, 300.0) },
                PathSegment::LineTo { to: Point::new(100.0, 300.0) },
            ]
        );
        assert!(annotation.validate().is_ok());
    }

    #[test]
    fn test_polygon_gets_closed_path() {
        let (mut store, mut settings, view, mut ctl) = setup();
        settings.select_tool(Tool::Polygon);
        ctl.pointer_down(&mut store, &settings, &view, v(100.0, 100.0));
        ctl.pointer_move(&mut store, &view, v(200.0, 200.0));
        let id = ctl.active_annotation().unwrap();
        ctl.pointer_up(&mut store, &view);
        let path = &store.get(id).unwrap().properties().path;
        assert_eq!(path.len(), 4);
        assert_eq!(path.last(), Some(&PathSegment::Close));
    }

    #[test]
    fn test_text_tap_places_and_selects() {
        let (mut store, mut settings, view, mut ctl) = setup();
        settings.select_tool(Tool::Text);
        assert_eq!(ctl.pointer_down(&mut store, &settings, &view, v(300.0, 400.0)), InteractionState::Idle);
        let text = store.selected().unwrap();
        assert_eq!(text.tool(), Tool::Text);
        assert!(text.is_editing());
        assert_eq!(text.frame().center(), Point::new(300.0, 400.0));
    }

    #[test]
    fn test_signature_needs_image() {
        let (mut store, mut settings, view, mut ctl) = setup();
        settings.select_tool(Tool::Signature);
        ctl.pointer_down(&mut store, &settings, &view, v(300.0, 400.0));
        assert!(store.is_empty());

        settings.set_signature(Some(vec![1, 2, 3]));
        ctl.pointer_down(&mut store, &settings, &view, v(300.0, 400.0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_eraser_removes_topmost() {
        let (mut store, mut settings, view, mut ctl) = setup();
        let low = store.add(Annotation::new(Tool::Rectangle, Rect::new(0.0, 0.0, 100.0, 100.0), 0));
        let high = store.add(Annotation::new(Tool::Oval, Rect::new(50.0, 50.0, 100.0, 100.0), 0));
        settings.select_tool(Tool::Eraser);

        assert_eq!(ctl.pointer_down(&mut store, &settings, &view, v(75.0, 75.0)), InteractionState::Erasing);
        assert!(store.get(high).is_none());
        assert!(store.get(low).is_some());
        ctl.pointer_up(&mut store, &view);

        store.undo();
        assert!(store.get(high).is_some());
    }

    #[test]
    fn test_pinch_scales_text_and_font() {
        let (mut store, _settings, view, mut ctl) = setup();
        let id = store.add(Annotation::new(Tool::Text, Rect::new(200.0, 200.0, 100.0, 40.0), 0));
        store.select(Some(id)).unwrap();

        assert!(ctl.pinch_begin(&store));
        assert_eq!(ctl.state(), InteractionState::Scaling);
        ctl.pinch_update(&mut store, &view, 1.5);
        ctl.pinch_update(&mut store, &view, 2.0);
        ctl.pinch_end(&mut store);

        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.frame(), Rect::new(150.0, 180.0, 200.0, 80.0));
        assert_eq!(annotation.properties().font_size, 32.0);

        store.undo();
        assert_eq!(store.get(id).unwrap().properties().font_size, 16.0);
    }

    #[test]
    fn test_pinch_without_selection() {
        let (store, _settings, _view, mut ctl) = setup();
        assert!(!ctl.pinch_begin(&store));
        assert_eq!(ctl.state(), InteractionState::Idle);
    }

    #[test]
    fn test_cancel_restores_start() {
        let (mut store, settings, view, mut ctl) = setup();
        let id = store.add(Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 100.0, 100.0), 0));
        let undo_before = store.history().undo_len();
        ctl.pointer_down(&mut store, &settings, &view, v(150.0, 150.0));
        ctl.pointer_move(&mut store, &view, v(300.0, 300.0));
        ctl.cancel(&mut store, &view);

        assert_eq!(store.get(id).unwrap().frame(), Rect::new(100.0, 100.0, 100.0, 100.0));
        assert_eq!(store.history().undo_len(), undo_before);
        assert_eq!(ctl.state(), InteractionState::Idle);
    }
}

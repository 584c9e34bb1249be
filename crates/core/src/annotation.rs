//! Annotation data model
//!
//! An annotation is a mutable record edited in place by interaction handlers
//! and property setters. Geometry is stored in PDF page space (origin at the
//! bottom-left, y up). The tool is fixed at creation; changing the kind of an
//! annotation means creating a new one.

use crate::geometry::{Affine, Point, Rect, EPSILON};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for an annotation
///
/// Stable across the document lifetime and persisted with the record.
pub type AnnotationId = uuid::Uuid;

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Closed set of editor tools
///
/// Every consumer (renderer, hit tester, scale limits, persistence) matches
/// exhaustively, so adding a tool forces each of them to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    Selection,
    Pen,
    Highlighter,
    Text,
    Signature,
    Note,
    Rectangle,
    Oval,
    Line,
    Arrow,
    Polygon,
    Magnifier,
    Eraser,
}

impl Tool {
    pub const ALL: [Tool; 13] = [
        Tool::Selection,
        Tool::Pen,
        Tool::Highlighter,
        Tool::Text,
        Tool::Signature,
        Tool::Note,
        Tool::Rectangle,
        Tool::Oval,
        Tool::Line,
        Tool::Arrow,
        Tool::Polygon,
        Tool::Magnifier,
        Tool::Eraser,
    ];

    /// Stable tag used in persisted records
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Selection => "selection",
            Tool::Pen => "pen",
            Tool::Highlighter => "highlighter",
            Tool::Text => "text",
            Tool::Signature => "signature",
            Tool::Note => "note",
            Tool::Rectangle => "rectangle",
            Tool::Oval => "oval",
            Tool::Line => "line",
            Tool::Arrow => "arrow",
            Tool::Polygon => "polygon",
            Tool::Magnifier => "magnifier",
            Tool::Eraser => "eraser",
        }
    }

    /// Pen and highlighter accumulate a freehand path
    pub fn is_freehand(self) -> bool {
        matches!(self, Tool::Pen | Tool::Highlighter)
    }

    /// Tools whose shape is defined by a drag from one corner to another
    pub fn is_drag_shape(self) -> bool {
        matches!(
            self,
            Tool::Rectangle
                | Tool::Oval
                | Tool::Line
                | Tool::Arrow
                | Tool::Polygon
                | Tool::Magnifier
        )
    }

    /// Selection and eraser never produce visible content
    pub fn is_exportable(self) -> bool {
        match self {
            Tool::Selection | Tool::Eraser => false,
            Tool::Pen
            | Tool::Highlighter
            | Tool::Text
            | Tool::Signature
            | Tool::Note
            | Tool::Rectangle
            | Tool::Oval
            | Tool::Line
            | Tool::Arrow
            | Tool::Polygon
            | Tool::Magnifier => true,
        }
    }

    /// Allowed pinch scale factor range relative to the gesture start
    pub fn scale_limits(self) -> (f32, f32) {
        match self {
            Tool::Signature => (0.25, 3.0),
            Tool::Text | Tool::Note => (0.3, 4.0),
            Tool::Highlighter => (0.2, 3.0),
            Tool::Pen
            | Tool::Rectangle
            | Tool::Oval
            | Tool::Line
            | Tool::Arrow
            | Tool::Polygon
            | Tool::Magnifier => (0.3, 3.0),
            Tool::Selection | Tool::Eraser => (1.0, 1.0),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tool tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool tag: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .iter()
            .copied()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_owned()))
    }
}

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Convert to normalized RGBA values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

/// Common annotation colors
impl Color {
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const NOTE_YELLOW: Color = Color::rgb(255, 214, 10);
}

/// One operator of a freehand or shape path, in page space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PathSegment {
    MoveTo { to: Point },
    LineTo { to: Point },
    QuadTo { ctrl: Point, to: Point },
    CurveTo { ctrl1: Point, ctrl2: Point, to: Point },
    Close,
}

impl PathSegment {
    /// Every point referenced by the segment, control points included
    pub fn points(&self) -> impl Iterator<Item = Point> {
        let pts: [Option<Point>; 3] = match *self {
            PathSegment::MoveTo { to } | PathSegment::LineTo { to } => [Some(to), None, None],
            PathSegment::QuadTo { ctrl, to } => [Some(ctrl), Some(to), None],
            PathSegment::CurveTo { ctrl1, ctrl2, to } => [Some(ctrl1), Some(ctrl2), Some(to)],
            PathSegment::Close => [None, None, None],
        };
        pts.into_iter().flatten()
    }

    pub fn end_point(&self) -> Option<Point> {
        match *self {
            PathSegment::MoveTo { to }
            | PathSegment::LineTo { to }
            | PathSegment::QuadTo { to, .. }
            | PathSegment::CurveTo { to, .. } => Some(to),
            PathSegment::Close => None,
        }
    }
}

/// Bounding box of every point in a path
pub fn path_bounds(path: &[PathSegment]) -> Option<Rect> {
    Rect::envelope(path.iter().flat_map(|segment| segment.points()))
}

/// Arrow-head style for the arrow tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrowHead {
    None,
    Open,
    #[default]
    Closed,
}

/// Horizontal text alignment inside the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Per-annotation visual properties and type-specific payload
///
/// Only the fields relevant to the annotation's tool are meaningful; the
/// renderer and hit tester ignore the rest. Path and signature bytes are
/// carried in the record payload slot when persisted, not in the
/// serialized properties bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Properties {
    pub stroke_color: Color,
    pub fill_color: Option<Color>,
    pub stroke_width: f32,
    pub opacity: f32,
    pub dash_pattern: Vec<f32>,
    pub corner_radius: f32,
    pub arrow_head: ArrowHead,
    #[serde(skip)]
    pub path: Vec<PathSegment>,
    pub text: String,
    pub font_name: String,
    pub font_size: f32,
    pub alignment: TextAlignment,
    #[serde(skip)]
    pub signature: Option<Vec<u8>>,
    pub note_author: Option<String>,
    pub magnification: f32,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            stroke_color: Color::BLACK,
            fill_color: None,
            stroke_width: 2.0,
            opacity: 1.0,
            dash_pattern: Vec::new(),
            corner_radius: 0.0,
            arrow_head: ArrowHead::Closed,
            path: Vec::new(),
            text: String::new(),
            font_name: "Helvetica".to_string(),
            font_size: 16.0,
            alignment: TextAlignment::Left,
            signature: None,
            note_author: None,
            magnification: 2.0,
        }
    }
}

impl Properties {
    /// Default properties for a freshly created annotation of `tool`
    pub fn for_tool(tool: Tool) -> Self {
        let base = Self::default();
        match tool {
            Tool::Highlighter => Self {
                stroke_color: Color::YELLOW,
                stroke_width: 14.0,
                opacity: 0.5,
                ..base
            },
            Tool::Note => Self {
                stroke_color: Color::BLACK,
                fill_color: Some(Color::NOTE_YELLOW),
                ..base
            },
            Tool::Text => Self { stroke_color: Color::BLACK, stroke_width: 0.0, ..base },
            Tool::Rectangle | Tool::Oval | Tool::Polygon => {
                Self { stroke_color: Color::RED, ..base }
            }
            Tool::Line | Tool::Arrow => Self { stroke_color: Color::RED, ..base },
            Tool::Magnifier => Self { stroke_color: Color::BLUE, stroke_width: 1.5, ..base },
            Tool::Selection
            | Tool::Pen
            | Tool::Signature
            | Tool::Eraser => base,
        }
    }

    /// Number of path operators
    pub fn path_len(&self) -> usize {
        self.path.len()
    }
}

/// Immutable copy of an annotation's mutable fields
///
/// Captured before an in-place edit so the edit can be undone.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub frame: Rect,
    pub rotation: f32,
    pub properties: Properties,
}

/// Reasons an annotation cannot be persisted or composited
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("annotation {0} has a non-finite {1}")]
    NonFinite(AnnotationId, &'static str),
    #[error("annotation {0} has a zero-area frame")]
    ZeroArea(AnnotationId),
}

/// Field values used to rebuild an annotation from storage
#[derive(Debug, Clone)]
pub struct AnnotationParts {
    pub id: AnnotationId,
    pub tool: Tool,
    pub frame: Rect,
    pub rotation: f32,
    pub page_index: u32,
    pub z_index: i64,
    pub properties: Properties,
    pub created_at: i64,
    pub modified_at: i64,
}

/// A single annotation on a page
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Stable unique identifier
    id: AnnotationId,

    /// Tool that created this annotation
    tool: Tool,

    /// Un-rotated bounds in page space
    frame: Rect,

    /// Degrees, counter-clockwise as displayed, about the frame center
    rotation: f32,

    /// Zero-based page index
    page_index: u32,

    /// Paint and hit-test order within a page (higher = on top)
    z_index: i64,

    properties: Properties,

    /// Unix milliseconds
    created_at: i64,

    /// Unix milliseconds, strictly increasing on every mutation
    modified_at: i64,

    // View state, never persisted
    selected: bool,
    dragging: bool,
    editing: bool,
}

impl Annotation {
    /// Create a new annotation with default properties for the tool
    pub fn new(tool: Tool, frame: Rect, page_index: u32) -> Self {
        Self::with_properties(tool, frame, page_index, Properties::for_tool(tool))
    }

    /// Create a new annotation with explicit properties
    pub fn with_properties(
        tool: Tool,
        frame: Rect,
        page_index: u32,
        properties: Properties,
    ) -> Self {
        let now = now_millis();
        Self {
            id: AnnotationId::new_v4(),
            tool,
            frame,
            rotation: 0.0,
            page_index,
            z_index: 0,
            properties,
            created_at: now,
            modified_at: now,
            selected: false,
            dragging: false,
            editing: false,
        }
    }

    /// Rebuild an annotation with a known identity (deserialization)
    pub fn from_parts(parts: AnnotationParts) -> Self {
        Self {
            id: parts.id,
            tool: parts.tool,
            frame: parts.frame,
            rotation: parts.rotation,
            page_index: parts.page_index,
            z_index: parts.z_index,
            properties: parts.properties,
            created_at: parts.created_at,
            modified_at: parts.modified_at,
            selected: false,
            dragging: false,
            editing: false,
        }
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn frame(&self) -> Rect {
        self.frame
    }

    pub fn set_frame(&mut self, frame: Rect) {
        self.frame = frame;
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Set rotation, normalized into (-180, 180]
    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = normalize_degrees(degrees);
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn set_page_index(&mut self, page_index: u32) {
        self.page_index = page_index;
    }

    pub fn z_index(&self) -> i64 {
        self.z_index
    }

    pub(crate) fn set_z_index(&mut self, z_index: i64) {
        self.z_index = z_index;
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn modified_at(&self) -> i64 {
        self.modified_at
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    /// Advance the modification timestamp
    ///
    /// Never goes backwards and always changes, so `(id, modified_at)` keys
    /// are invalidated by every mutation even within one millisecond.
    pub fn touch(&mut self) {
        self.modified_at = now_millis().max(self.modified_at + 1);
    }

    /// Replace the id; only the store does this, to keep ids unique
    pub(crate) fn assign_fresh_id(&mut self) {
        self.id = AnnotationId::new_v4();
    }

    /// Deep copy with a fresh identity, fresh timestamps and cleared view state
    pub fn copy(&self) -> Self {
        let now = now_millis();
        Self {
            id: AnnotationId::new_v4(),
            created_at: now,
            modified_at: now,
            selected: false,
            dragging: false,
            editing: false,
            ..self.clone()
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { frame: self.frame, rotation: self.rotation, properties: self.properties.clone() }
    }

    /// Restore frame, rotation and properties from a snapshot
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.frame = snapshot.frame;
        self.rotation = snapshot.rotation;
        self.properties = snapshot.properties.clone();
        self.touch();
    }

    /// Rotation-aware point containment in page space
    ///
    /// The point is moved into the annotation's unrotated frame by applying
    /// the negative rotation about the frame center, then tested against the
    /// plain rectangle.
    pub fn contains(&self, point: &Point) -> bool {
        let local = point.rotated_about(self.frame.center(), -self.rotation);
        self.frame.contains(&local)
    }

    /// Bounds of the frame after rotation, in page space
    pub fn rotated_bounds(&self) -> Rect {
        self.frame.rotated_bounds(self.rotation)
    }

    /// Frame corners after rotation, in the order min/min, max/min, max/max, min/max
    pub fn rotated_corners(&self) -> [Point; 4] {
        let center = self.frame.center();
        self.frame.corners().map(|corner| corner.rotated_about(center, self.rotation))
    }

    /// Bounds of the stored path, if any
    pub fn path_bounds(&self) -> Option<Rect> {
        path_bounds(&self.properties.path)
    }

    /// Transform from the stored page-space path onto the current frame
    ///
    /// Each axis maps the path bounds onto the frame. An axis on which the
    /// path has no extent (a horizontal or vertical line) is only centered.
    pub fn path_to_frame(&self) -> Affine {
        let Some(bounds) = self.path_bounds() else {
            return Affine::IDENTITY;
        };
        let frame = self.frame;
        let axis = |path_min: f32, path_len: f32, path_mid: f32, frame_min: f32, frame_len: f32, frame_mid: f32| {
            if path_len > EPSILON {
                let scale = frame_len / path_len;
                (scale, frame_min - path_min * scale)
            } else {
                (1.0, frame_mid - path_mid)
            }
        };
        let (sx, tx) = axis(
            bounds.min_x(),
            bounds.width(),
            bounds.center().x,
            frame.min_x(),
            frame.width(),
            frame.center().x,
        );
        let (sy, ty) = axis(
            bounds.min_y(),
            bounds.height(),
            bounds.center().y,
            frame.min_y(),
            frame.height(),
            frame.center().y,
        );
        Affine::new(sx, 0.0, 0.0, sy, tx, ty)
    }

    /// Reject NaN/inf geometry and zero-area frames
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.frame.is_finite() {
            return Err(ValidationError::NonFinite(self.id, "frame"));
        }
        if !self.rotation.is_finite() {
            return Err(ValidationError::NonFinite(self.id, "rotation"));
        }
        let props = &self.properties;
        if !props.stroke_width.is_finite()
            || !props.opacity.is_finite()
            || !props.font_size.is_finite()
        {
            return Err(ValidationError::NonFinite(self.id, "properties"));
        }
        if props.path.iter().flat_map(|s| s.points()).any(|p| !p.is_finite()) {
            return Err(ValidationError::NonFinite(self.id, "path"));
        }
        if self.frame.is_degenerate() {
            return Err(ValidationError::ZeroArea(self.id));
        }
        Ok(())
    }
}

/// Normalize an angle into (-180, 180]
pub fn normalize_degrees(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let mut d = degrees % 360.0;
    if d <= -180.0 {
        d += 360.0;
    } else if d > 180.0 {
        d -= 360.0;
    }
    d
}

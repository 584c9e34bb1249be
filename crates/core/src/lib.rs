//! PDF Markup Core Library
//!
//! Annotation model, coordinate conversion, store with undo/redo, and the
//! interaction state machine for editing annotations on PDF pages.

pub mod annotation;
pub mod config;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod manipulation;
pub mod session;
pub mod simplify;
pub mod store;

pub use annotation::{
    normalize_degrees, now_millis, path_bounds, Annotation, AnnotationId, AnnotationParts,
    ArrowHead, Color, PathSegment, Properties, Snapshot, TextAlignment, Tool, UnknownTool,
    ValidationError,
};
pub use config::{ConfigError, EngineConfig};
pub use geometry::{
    adjust_origin_for_corner_resize, adjust_origin_for_resize, clamp_origin, Affine,
    CoordinateConverter, Corner, Point, Rect, Size,
};
pub use history::{Action, ActionLog, DEFAULT_HISTORY_CAPACITY};
pub use interaction::{InteractionController, InteractionState, PageView};
pub use manipulation::{handle_positions, hit_handle, Handle};
pub use session::{Session, SessionSettings};
pub use store::{AnnotationStore, StoreError, StoreEvent, StoreResult};

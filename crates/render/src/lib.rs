//! PDF Markup Render Library
//!
//! Compositor for the live editing view and the rasterizer behind
//! flattened PDF export. Both paint annotations with the same per-tool
//! drawing code, so exported stamps match what the editor shows.

mod compositor;
mod draw;
mod flatten;
mod font;
mod overlay;

use pdf_markup_core::ValidationError;
use thiserror::Error;

pub use compositor::{Compositor, RenderOptions, RenderSummary};
pub use draw::{blend_mode, paint_annotation, visual_bounds};
pub use flatten::{
    collect_stamps, export_flattened, rasterize_stamp, ExportError, ExportReport, SkipReason,
    StampOptions,
};
pub use font::FontBook;
pub use overlay::paint_selection;

/// Reasons a single annotation could not be painted
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} raster")]
    Allocation { width: u32, height: u32 },

    #[error("annotation has no drawable path")]
    EmptyPath,

    #[error("signature has no image data")]
    MissingImage,

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("font data could not be parsed")]
    InvalidFont,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

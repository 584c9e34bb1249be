//! PDF Markup Cache Library
//!
//! LRU bitmap cache used by the compositor to keep rasterized annotations
//! between frames.

pub mod config;
pub mod ram;

pub use config::{CacheConfig, ConfigError};
pub use ram::{BitmapCache, CacheStats, CachedBitmap};

//! Render cache configuration
//!
//! Limits for the annotation bitmap cache and the path length above which
//! freehand annotations are cached at all. Configuration can be loaded from
//! a `key = value` file, environment variables, or created programmatically.

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Configuration for the render cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of cached bitmaps
    pub max_entries: usize,
    /// Maximum total bitmap memory in bytes
    pub max_bytes: usize,
    /// Freehand paths with more segments than this are cached
    pub path_segment_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            max_bytes: 64 * 1024 * 1024, // 64 MB
            path_segment_threshold: 200,
        }
    }
}

impl CacheConfig {
    /// Sets the entry limit.
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Sets the memory limit in megabytes.
    pub fn with_max_mb(mut self, mb: usize) -> Self {
        self.max_bytes = mb * 1024 * 1024;
        self
    }

    pub fn with_path_segment_threshold(mut self, segments: usize) -> Self {
        self.path_segment_threshold = segments;
        self
    }

    /// Returns the memory limit in megabytes.
    pub fn max_mb(&self) -> usize {
        self.max_bytes / (1024 * 1024)
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_MARKUP_CACHE_ENTRIES`: maximum cached bitmaps (default: 64)
    /// - `PDF_MARKUP_CACHE_MB`: memory limit in MB (default: 64)
    /// - `PDF_MARKUP_CACHE_PATH_THRESHOLD`: path segments before caching (default: 200)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PDF_MARKUP_CACHE_ENTRIES") {
            config.max_entries = parse_count("PDF_MARKUP_CACHE_ENTRIES", &val)?;
        }
        if let Ok(val) = std::env::var("PDF_MARKUP_CACHE_MB") {
            config.max_bytes = parse_count("PDF_MARKUP_CACHE_MB", &val)? * 1024 * 1024;
        }
        if let Ok(val) = std::env::var("PDF_MARKUP_CACHE_PATH_THRESHOLD") {
            config.path_segment_threshold = parse_count("PDF_MARKUP_CACHE_PATH_THRESHOLD", &val)?;
        }

        Ok(config)
    }

    /// Loads configuration from a file.
    ///
    /// Expected file format:
    /// ```text
    /// max_entries = 64
    /// max_mb = 64
    /// path_segment_threshold = 200
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    /// Parses `key = value` lines; unknown keys are ignored.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            match key {
                "max_entries" => config.max_entries = parse_count(key, value)?,
                "max_mb" => config.max_bytes = parse_count(key, value)? * 1024 * 1024,
                "path_segment_threshold" => config.path_segment_threshold = parse_count(key, value)?,
                _ => tracing::debug!(key, "ignoring unknown cache config key"),
            }
        }

        Ok(config)
    }

    /// Saves configuration to a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.render())?;
        Ok(())
    }

    fn render(&self) -> String {
        format!(
            "# PDF Markup Render Cache Configuration\n\
             max_entries = {}\n\
             max_mb = {}\n\
             path_segment_threshold = {}\n",
            self.max_entries,
            self.max_mb(),
            self.path_segment_threshold
        )
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

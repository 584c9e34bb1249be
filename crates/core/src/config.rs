//! Engine configuration
//!
//! Tunables for manipulation limits, touch targets, rotation snapping and
//! history depth. Configuration can be loaded from a file, environment
//! variables, or created programmatically.

use crate::geometry::Size;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Errors that can occur during configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    /// I/O error reading or writing a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration for annotation editing
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Smallest frame a resize or scale may produce (page units)
    pub min_size: Size,
    /// Largest frame a resize or scale may produce (page units)
    pub max_size: Size,
    /// Handle touch-target radius in view pixels
    pub touch_radius: f32,
    /// Distance of the rotation handle above the top edge, in view pixels
    pub rotation_handle_offset: f32,
    /// Snap rotation to multiples of `snap_increment_degrees`
    pub snap_rotation: bool,
    /// Snap when within this many degrees of a multiple
    pub snap_threshold_degrees: f32,
    pub snap_increment_degrees: f32,
    /// Undo stack depth
    pub history_capacity: usize,
    /// Path simplification tolerance in page units (0 disables)
    pub simplify_tolerance: f32,
    /// Default frame size for tap-placed text boxes
    pub text_size: Size,
    /// Default frame size for tap-placed notes
    pub note_size: Size,
    /// Default frame size for tap-placed signatures
    pub signature_size: Size,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_size: Size::new(20.0, 20.0),
            max_size: Size::new(2000.0, 2000.0),
            touch_radius: 22.0,
            rotation_handle_offset: 30.0,
            snap_rotation: true,
            snap_threshold_degrees: 5.0,
            snap_increment_degrees: 45.0,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            simplify_tolerance: 0.5,
            text_size: Size::new(160.0, 40.0),
            note_size: Size::new(24.0, 24.0),
            signature_size: Size::new(200.0, 80.0),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

/// Parse `"<w>x<h>"`
fn parse_size(key: &str, value: &str) -> Result<Size, ConfigError> {
    let (w, h) = value
        .trim()
        .split_once('x')
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))?;
    let size = Size::new(parse_value(key, w)?, parse_value(key, h)?);
    if !size.is_finite() || size.width <= 0.0 || size.height <= 0.0 {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }
    Ok(size)
}

impl EngineConfig {
    pub fn with_min_size(mut self, size: Size) -> Self {
        self.min_size = size;
        self
    }

    pub fn with_max_size(mut self, size: Size) -> Self {
        self.max_size = size;
        self
    }

    pub fn with_touch_radius(mut self, radius: f32) -> Self {
        self.touch_radius = radius;
        self
    }

    pub fn with_rotation_snapping(mut self, enabled: bool) -> Self {
        self.snap_rotation = enabled;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_simplify_tolerance(mut self, tolerance: f32) -> Self {
        self.simplify_tolerance = tolerance;
        self
    }

    /// Apply one `key = value` setting
    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "min_size" => self.min_size = parse_size(key, value)?,
            "max_size" => self.max_size = parse_size(key, value)?,
            "touch_radius" => self.touch_radius = parse_value(key, value)?,
            "rotation_handle_offset" => self.rotation_handle_offset = parse_value(key, value)?,
            "snap_rotation" => self.snap_rotation = parse_bool(key, value)?,
            "snap_threshold_degrees" => self.snap_threshold_degrees = parse_value(key, value)?,
            "history_capacity" => self.history_capacity = parse_value(key, value)?,
            "simplify_tolerance" => self.simplify_tolerance = parse_value(key, value)?,
            _ => tracing::debug!(key, "ignoring unknown configuration key"),
        }
        Ok(())
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_MARKUP_MIN_SIZE`: minimum frame, e.g. `20x20`
    /// - `PDF_MARKUP_MAX_SIZE`: maximum frame, e.g. `2000x2000`
    /// - `PDF_MARKUP_TOUCH_RADIUS`: handle touch radius in pixels
    /// - `PDF_MARKUP_SNAP_ROTATION`: `true`/`false`
    /// - `PDF_MARKUP_HISTORY_CAPACITY`: undo depth
    /// - `PDF_MARKUP_SIMPLIFY_TOLERANCE`: path simplification tolerance
    pub fn from_env() -> Result<Self, ConfigError> {
        const VARS: [(&str, &str); 6] = [
            ("PDF_MARKUP_MIN_SIZE", "min_size"),
            ("PDF_MARKUP_MAX_SIZE", "max_size"),
            ("PDF_MARKUP_TOUCH_RADIUS", "touch_radius"),
            ("PDF_MARKUP_SNAP_ROTATION", "snap_rotation"),
            ("PDF_MARKUP_HISTORY_CAPACITY", "history_capacity"),
            ("PDF_MARKUP_SIMPLIFY_TOLERANCE", "simplify_tolerance"),
        ];

        let mut config = Self::default();
        for (var, key) in VARS {
            if let Ok(value) = std::env::var(var) {
                config.apply(key, &value).map_err(|_| ConfigError::InvalidValue(var.to_string()))?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a `key = value` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    /// Parses `key = value` lines; `#` starts a comment line
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config.apply(key.trim(), value.trim().trim_matches('"'))?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration in the format read by [`EngineConfig::from_file`].
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_config_string())?;
        Ok(())
    }

    fn to_config_string(&self) -> String {
        format!(
            "# PDF markup engine configuration\n\
             min_size = {}x{}\n\
             max_size = {}x{}\n\
             touch_radius = {}\n\
             rotation_handle_offset = {}\n\
             snap_rotation = {}\n\
             snap_threshold_degrees = {}\n\
             history_capacity = {}\n\
             simplify_tolerance = {}\n",
            self.min_size.width,
            self.min_size.height,
            self.max_size.width,
            self.max_size.height,
            self.touch_radius,
            self.rotation_handle_offset,
            self.snap_rotation,
            self.snap_threshold_degrees,
            self.history_capacity,
            self.simplify_tolerance,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size.width > self.max_size.width || self.min_size.height > self.max_size.height
        {
            return Err(ConfigError::InvalidValue("min_size".to_string()));
        }
        if !(self.touch_radius.is_finite() && self.touch_radius > 0.0) {
            return Err(ConfigError::InvalidValue("touch_radius".to_string()));
        }
        if !(self.simplify_tolerance.is_finite() && self.simplify_tolerance >= 0.0) {
            return Err(ConfigError::InvalidValue("simplify_tolerance".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_VARS: [&str; 6] = [
        "PDF_MARKUP_MIN_SIZE",
        "PDF_MARKUP_MAX_SIZE",
        "PDF_MARKUP_TOUCH_RADIUS",
        "PDF_MARKUP_SNAP_ROTATION",
        "PDF_MARKUP_HISTORY_CAPACITY",
        "PDF_MARKUP_SIMPLIFY_TOLERANCE",
    ];

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.min_size, Size::new(20.0, 20.0));
        assert_eq!(config.max_size, Size::new(2000.0, 2000.0));
        assert_eq!(config.history_capacity, 50);
        assert!(config.snap_rotation);
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_touch_radius(30.0)
            .with_rotation_snapping(false)
            .with_history_capacity(10);
        assert_eq!(config.touch_radius, 30.0);
        assert!(!config.snap_rotation);
        assert_eq!(config.history_capacity, 10);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ENV_VARS);
        for var in ENV_VARS {
            env::remove_var(var);
        }
        env::set_var("PDF_MARKUP_MIN_SIZE", "10x12");
        env::set_var("PDF_MARKUP_SNAP_ROTATION", "off");
        env::set_var("PDF_MARKUP_HISTORY_CAPACITY", "25");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.min_size, Size::new(10.0, 12.0));
        assert!(!config.snap_rotation);
        assert_eq!(config.history_capacity, 25);
        assert_eq!(config.max_size, Size::new(2000.0, 2000.0)); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ENV_VARS);
        env::set_var("PDF_MARKUP_TOUCH_RADIUS", "wide");
        match EngineConfig::from_env() {
            Err(ConfigError::InvalidValue(key)) => assert_eq!(key, "PDF_MARKUP_TOUCH_RADIUS"),
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_parse_partial() {
        let config = EngineConfig::parse(
            r#"
            # comment
            touch_radius = 18
            max_size = "500x400"
            "#,
        )
        .unwrap();
        assert_eq!(config.touch_radius, 18.0);
        assert_eq!(config.max_size, Size::new(500.0, 400.0));
        assert_eq!(config.min_size, Size::new(20.0, 20.0));
    }

    #[test]
    fn test_parse_rejects_inverted_limits() {
        assert!(EngineConfig::parse("min_size = 100x100\nmax_size = 50x50").is_err());
        assert!(EngineConfig::parse("min_size = 0x10").is_err());
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.conf");
        let config = EngineConfig::default().with_touch_radius(30.0).with_history_capacity(7);
        config.save_to_file(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }
}

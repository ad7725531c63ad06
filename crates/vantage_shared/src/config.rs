//! # Runtime Configuration
//!
//! Loaded once at startup. Every field has a default, so an empty file is a
//! valid configuration.
//!
//! ```toml
//! max_fps = 30
//! picking = true
//! move_picking = false
//! click_slop_px = 1.0
//! render_texture_size = 512
//! rearm_ready_signal = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime knobs for a VANTAGE context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VantageConfig {
    /// Frame rate targeted by the fallback timer.
    pub max_fps: u32,
    /// Whether picking queries touch the device at all.
    pub picking: bool,
    /// Whether pointer moves pick and dispatch hover transitions.
    pub move_picking: bool,
    /// Maximum per-axis pointer travel (pixels) still counted as a click.
    pub click_slop_px: f32,
    /// Edge length of render-to-texture targets.
    pub render_texture_size: u32,
    /// Allow the surface `load` signal to fire again after new loads finish.
    pub rearm_ready_signal: bool,
}

impl VantageConfig {
    /// Default fallback frame rate.
    pub const DEFAULT_MAX_FPS: u32 = 30;
    /// Default render-to-texture size.
    pub const DEFAULT_RENDER_TEXTURE_SIZE: u32 = 512;

    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_fps: Self::DEFAULT_MAX_FPS,
            picking: true,
            move_picking: false,
            click_slop_px: 1.0,
            render_texture_size: Self::DEFAULT_RENDER_TEXTURE_SIZE,
            rearm_ready_signal: false,
        }
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`Self::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fps == 0 {
            return Err(ConfigError::Invalid("max_fps must be at least 1".into()));
        }
        if !self.click_slop_px.is_finite() || self.click_slop_px < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "click_slop_px must be a non-negative number, got {}",
                self.click_slop_px
            )));
        }
        if self.render_texture_size == 0 {
            return Err(ConfigError::Invalid(
                "render_texture_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Fallback timer interval in milliseconds.
    #[must_use]
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / f64::from(self.max_fps.max(1))
    }
}

impl Default for VantageConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = VantageConfig::from_toml_str("").unwrap();
        assert_eq!(config, VantageConfig::default());
        assert_eq!(config.max_fps, 30);
        assert!(config.picking);
        assert!(!config.move_picking);
    }

    #[test]
    fn test_partial_override() {
        let config = VantageConfig::from_toml_str("max_fps = 60\nmove_picking = true").unwrap();
        assert_eq!(config.max_fps, 60);
        assert!(config.move_picking);
        assert_eq!(config.render_texture_size, 512);
    }

    #[test]
    fn test_rejects_zero_fps() {
        let err = VantageConfig::from_toml_str("max_fps = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_negative_slop() {
        let err = VantageConfig::from_toml_str("click_slop_px = -2.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_key() {
        let err = VantageConfig::from_toml_str("fps = 10").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_frame_interval() {
        let config = VantageConfig::new();
        assert!((config.frame_interval_ms() - 33.333).abs() < 0.01);
    }
}

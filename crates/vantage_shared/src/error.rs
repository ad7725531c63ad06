//! # Configuration Error Types

use thiserror::Error;

/// Errors raised while loading or validating a [`crate::VantageConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML text could not be parsed into a configuration.
    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

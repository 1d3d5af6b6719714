//! Core error types

use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    /// Configuration file is not valid TOML or has mistyped values
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required key is absent
    #[error("Missing required configuration key: {0}")]
    Missing(&'static str),

    /// A key is present but its value is unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

//! Shared configuration and logging helpers for the routegraph workspace
//!
//! # Modules
//!
//! - `config` - Layered configuration: defaults, YAML documents, environment
//!   overrides and range validation through the [`config::ConfigBuilder`] trait
//! - `logging` - `tracing-subscriber` initialisation and timing guards

pub mod config;
pub mod logging;

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value outside its accepted range
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Field or environment key that was rejected
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// An environment variable could not be decoded
    #[error("Environment variable {0} contains invalid UTF-8")]
    NotUnicode(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create an invalid-value error for a field
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::invalid("top_n", "must be at least 1");
        assert_eq!(err.to_string(), "Invalid value for 'top_n': must be at least 1");
    }
}

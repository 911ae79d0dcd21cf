//! Error types for the learning subsystem
//!
//! ```text
//! LearningError
//! ├── Configuration    - Out-of-range parameters
//! ├── Catalog          - Action catalog misuse
//! ├── InvalidReward    - Non-finite reward values
//! ├── Embedding        - Embedder failures or dimension mismatches
//! ├── Unscoreable      - A reward strategy could not score a result
//! ├── SnapshotFormat   - Snapshot import rejected
//! └── Io               - Snapshot and export file access
//! ```
//!
//! `Unscoreable` never escapes a [`RewardEngine`](crate::reward::RewardEngine):
//! the engine degrades it to the neutral reward and reports it.

use thiserror::Error;
use tooling::ConfigError;

/// Result type for learning operations
pub type Result<T> = std::result::Result<T, LearningError>;

/// Errors raised by the learning subsystem
#[derive(Error, Debug)]
pub enum LearningError {
    /// A parameter is outside its accepted range
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Catalog misuse (duplicate or unknown action, empty catalog)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A reward value was NaN or infinite
    #[error("Invalid reward {reward} for action '{action}'")]
    InvalidReward {
        /// Action the reward was reported against
        action: String,
        /// Offending value
        reward: f64,
    },

    /// The embedder failed, or produced a vector of the wrong size
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A reward strategy could not produce a score
    #[error("Unscoreable result: {0}")]
    Unscoreable(String),

    /// Snapshot import failed validation
    ///
    /// The importing component is left empty when this is returned.
    #[error("Snapshot format error: {0}")]
    SnapshotFormat(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LearningError {
    /// Create a catalog error
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create an unscoreable error
    pub fn unscoreable(msg: impl Into<String>) -> Self {
        Self::Unscoreable(msg.into())
    }

    /// Create a snapshot format error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::SnapshotFormat(msg.into())
    }

    /// Create a configuration error for a named parameter
    pub fn invalid_parameter(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigError::invalid(key, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_display() {
        let err = LearningError::invalid_parameter("top_n", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for 'top_n': must be at least 1"
        );
    }

    #[test]
    fn test_invalid_reward_display() {
        let err = LearningError::InvalidReward {
            action: "search".to_string(),
            reward: f64::NAN,
        };
        assert_eq!(err.to_string(), "Invalid reward NaN for action 'search'");
    }
}

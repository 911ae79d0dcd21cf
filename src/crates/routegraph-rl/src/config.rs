//! Learning parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tooling::config::{env_key, read_bool, read_parsed, ConfigBuilder, EnvSource};
use tooling::ConfigError;

/// Environment prefix for [`LearningConfig`] overrides
pub const ENV_PREFIX: &str = "ROUTEGRAPH_RL_";

/// How the future-value term of the Q update is computed
///
/// In both modes an explicitly chained follow-up signature supplies the
/// future term. They differ only when no follow-up is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// No follow-up means a future term of 0: the value moves toward the reward
    #[default]
    SingleStep,
    /// No follow-up means the current signature bootstraps from its own best value
    TemporalDifference,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleStep => write!(f, "single_step"),
            Self::TemporalDifference => write!(f, "temporal_difference"),
        }
    }
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single_step" | "single-step" | "single" => Ok(Self::SingleStep),
            "temporal_difference" | "temporal-difference" | "td" => Ok(Self::TemporalDifference),
            other => Err(format!("unknown update mode '{}'", other)),
        }
    }
}

/// Parameters of the action selector and Q-value store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Probability of picking a random action subset, in `[0, 1]`
    pub exploration_rate: f64,
    /// Floor for [`decay_exploration`](crate::selector::ActionSelector::decay_exploration)
    pub min_exploration_rate: f64,
    /// Step size α, in `(0, 1]`
    pub learning_rate: f64,
    /// Discount γ, in `[0, 1]`
    pub discount_factor: f64,
    /// Cosine similarity needed to reuse a signature, in `(0, 1]`
    pub similarity_threshold: f64,
    /// Actions chosen per selection, at least 1
    pub top_n: usize,
    pub update_mode: UpdateMode,
    /// Resolve paraphrases through the semantic index
    pub use_embeddings: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.1,
            min_exploration_rate: 0.01,
            learning_rate: 0.1,
            discount_factor: 0.9,
            similarity_threshold: 0.85,
            top_n: 1,
            update_mode: UpdateMode::SingleStep,
            use_embeddings: true,
        }
    }
}

impl LearningConfig {
    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate;
        self
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_discount_factor(mut self, gamma: f64) -> Self {
        self.discount_factor = gamma;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    pub fn with_embeddings(mut self, enabled: bool) -> Self {
        self.use_embeddings = enabled;
        self
    }
}

pub(crate) fn check_unit_interval(key: &str, value: f64) -> tooling::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(key, format!("{} is outside [0, 1]", value)));
    }
    Ok(())
}

pub(crate) fn check_half_open(key: &str, value: f64) -> tooling::Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ConfigError::invalid(key, format!("{} is outside (0, 1]", value)));
    }
    Ok(())
}

impl ConfigBuilder for LearningConfig {
    fn validate(&self) -> tooling::Result<()> {
        check_unit_interval("exploration_rate", self.exploration_rate)?;
        check_unit_interval("min_exploration_rate", self.min_exploration_rate)?;
        check_half_open("learning_rate", self.learning_rate)?;
        check_unit_interval("discount_factor", self.discount_factor)?;
        check_half_open("similarity_threshold", self.similarity_threshold)?;
        if self.top_n == 0 {
            return Err(ConfigError::invalid("top_n", "must be at least 1"));
        }
        Ok(())
    }

    fn apply_env(&mut self, prefix: &str, env: &dyn EnvSource) -> tooling::Result<()> {
        if let Some(v) = read_parsed(env, &env_key(prefix, "exploration_rate"))? {
            self.exploration_rate = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "min_exploration_rate"))? {
            self.min_exploration_rate = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "learning_rate"))? {
            self.learning_rate = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "discount_factor"))? {
            self.discount_factor = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "similarity_threshold"))? {
            self.similarity_threshold = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "top_n"))? {
            self.top_n = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "update_mode"))? {
            self.update_mode = v;
        }
        if let Some(v) = read_bool(env, &env_key(prefix, "use_embeddings"))? {
            self.use_embeddings = v;
        }
        Ok(())
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        let defaults = Self::default();
        if other.exploration_rate != defaults.exploration_rate {
            self.exploration_rate = other.exploration_rate;
        }
        if other.min_exploration_rate != defaults.min_exploration_rate {
            self.min_exploration_rate = other.min_exploration_rate;
        }
        if other.learning_rate != defaults.learning_rate {
            self.learning_rate = other.learning_rate;
        }
        if other.discount_factor != defaults.discount_factor {
            self.discount_factor = other.discount_factor;
        }
        if other.similarity_threshold != defaults.similarity_threshold {
            self.similarity_threshold = other.similarity_threshold;
        }
        if other.top_n != defaults.top_n {
            self.top_n = other.top_n;
        }
        if other.update_mode != defaults.update_mode {
            self.update_mode = other.update_mode;
        }
        if other.use_embeddings != defaults.use_embeddings {
            self.use_embeddings = other.use_embeddings;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tooling::config::MapEnv;

    #[test]
    fn test_defaults_are_valid() {
        let config = LearningConfig::build().unwrap();
        assert_eq!(config.top_n, 1);
        assert_eq!(config.update_mode, UpdateMode::SingleStep);
        assert!(config.use_embeddings);
    }

    #[test]
    fn test_range_rejections() {
        assert!(LearningConfig::default().with_exploration_rate(1.5).validate().is_err());
        assert!(LearningConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(LearningConfig::default().with_discount_factor(-0.1).validate().is_err());
        assert!(LearningConfig::default().with_similarity_threshold(0.0).validate().is_err());
        assert!(LearningConfig::default().with_top_n(0).validate().is_err());
        assert!(LearningConfig::default().with_learning_rate(f64::NAN).validate().is_err());

        assert!(LearningConfig::default().with_learning_rate(1.0).validate().is_ok());
        assert!(LearningConfig::default().with_discount_factor(0.0).validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env = MapEnv::new()
            .with("ROUTEGRAPH_RL_TOP_N", "3")
            .with("ROUTEGRAPH_RL_UPDATE_MODE", "td")
            .with("ROUTEGRAPH_RL_USE_EMBEDDINGS", "false");

        let config = LearningConfig::from_env_source(ENV_PREFIX, &env).unwrap();
        assert_eq!(config.top_n, 3);
        assert_eq!(config.update_mode, UpdateMode::TemporalDifference);
        assert!(!config.use_embeddings);
    }

    #[test]
    fn test_env_out_of_range_rejected() {
        let env = MapEnv::new().with("ROUTEGRAPH_RL_EXPLORATION_RATE", "2");
        assert!(LearningConfig::from_env_source(ENV_PREFIX, &env).is_err());
    }

    #[test]
    fn test_yaml() {
        let yaml = "exploration_rate: 0.3\nupdate_mode: temporal_difference\n";
        let config = LearningConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.exploration_rate, 0.3);
        assert_eq!(config.update_mode, UpdateMode::TemporalDifference);
        assert_eq!(config.similarity_threshold, 0.85);
    }

    #[test]
    fn test_merge() {
        let mut config = LearningConfig::default().with_top_n(2);
        config.merge(LearningConfig::default().with_learning_rate(0.5));
        assert_eq!(config.top_n, 2);
        assert_eq!(config.learning_rate, 0.5);
    }
}

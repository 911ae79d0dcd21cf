//! The `ConfigBuilder` trait

use super::env::{EnvSource, ProcessEnv};
use crate::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Layered construction for configuration structures
///
/// Implementors provide range validation and the environment overlay; the
/// provided methods compose those with defaults and YAML documents. Every
/// constructor validates before returning, so a value obtained through this
/// trait is always in range.
pub trait ConfigBuilder: Default + Clone + DeserializeOwned {
    /// Check every field against its accepted range
    fn validate(&self) -> Result<()>;

    /// Override fields from `{prefix}{FIELD}` variables found in `env`
    fn apply_env(&mut self, prefix: &str, env: &dyn EnvSource) -> Result<()>;

    /// Merge another configuration into this one
    ///
    /// Fields of `other` that differ from their defaults overwrite `self`;
    /// `Option` fields overwrite only when `Some`. Returns self for chaining.
    fn merge(&mut self, other: Self) -> &mut Self;

    /// Defaults, validated
    fn build() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment
    fn from_env(prefix: &str) -> Result<Self> {
        Self::from_env_source(prefix, &ProcessEnv)
    }

    /// Defaults overlaid with an explicit variable source
    fn from_env_source(prefix: &str, env: &dyn EnvSource) -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(prefix, env)?;
        config.validate()?;
        Ok(config)
    }

    /// Caller-supplied defaults overlaid with the process environment
    fn from_env_with_defaults(prefix: &str, defaults: Self) -> Result<Self> {
        let mut config = defaults;
        config.apply_env(prefix, &ProcessEnv)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document
    fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file
    fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a YAML document, then apply environment overrides on top
    fn from_yaml_with_env(yaml: &str, prefix: &str, env: &dyn EnvSource) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.apply_env(prefix, env)?;
        config.validate()?;
        Ok(config)
    }
}

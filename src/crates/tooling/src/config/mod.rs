//! Layered configuration loading
//!
//! Configuration structures in the workspace are assembled in three layers:
//!
//! 1. `Default` values
//! 2. An optional YAML document (fields missing from the document keep their defaults
//!    when the struct is annotated with `#[serde(default)]`)
//! 3. Environment overrides read through an [`EnvSource`]
//!
//! The result is validated once, after the last layer is applied.
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::config::{ConfigBuilder, EnvSource, read_parsed, env_key};
//!
//! #[derive(Clone, Default, serde::Deserialize)]
//! #[serde(default)]
//! struct PoolConfig {
//!     size: usize,
//! }
//!
//! impl ConfigBuilder for PoolConfig {
//!     fn validate(&self) -> tooling::Result<()> {
//!         if self.size == 0 {
//!             return Err(tooling::ConfigError::invalid("size", "must be positive"));
//!         }
//!         Ok(())
//!     }
//!
//!     fn apply_env(&mut self, prefix: &str, env: &dyn EnvSource) -> tooling::Result<()> {
//!         if let Some(size) = read_parsed(env, &env_key(prefix, "size"))? {
//!             self.size = size;
//!         }
//!         Ok(())
//!     }
//!
//!     fn merge(&mut self, other: Self) -> &mut Self {
//!         if other.size != 0 {
//!             self.size = other.size;
//!         }
//!         self
//!     }
//! }
//!
//! let config = PoolConfig::from_env("POOL_")?;
//! ```

mod builder;
mod env;

pub use builder::ConfigBuilder;
pub use env::{env_key, read_bool, read_parsed, read_string, EnvSource, MapEnv, ProcessEnv};

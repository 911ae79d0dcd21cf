//! Engine configuration

use routegraph_rl::LearningConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tooling::config::{env_key, read_bool, read_parsed, ConfigBuilder, EnvSource};
use tooling::ConfigError;

/// Environment prefix for engine settings, e.g. `ROUTEGRAPH_MAX_ITERATIONS`
pub const ENV_PREFIX: &str = "ROUTEGRAPH_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard bound on unit invocations per traversal
    pub max_iterations: usize,
    pub cycle_detection_enabled: bool,
    /// How many times a (unit, context fingerprint) pair may recur before
    /// the traversal is aborted as a cycle
    pub cycle_repeat_limit: usize,
    /// Per-invocation timeout; `None` waits indefinitely
    pub unit_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            cycle_detection_enabled: true,
            cycle_repeat_limit: 3,
            unit_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.cycle_detection_enabled = enabled;
        self
    }

    pub fn with_cycle_repeat_limit(mut self, limit: usize) -> Self {
        self.cycle_repeat_limit = limit;
        self
    }

    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_ms.map(Duration::from_millis)
    }
}

impl ConfigBuilder for EngineConfig {
    fn validate(&self) -> tooling::Result<()> {
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("max_iterations", "must be at least 1"));
        }
        if self.cycle_repeat_limit == 0 {
            return Err(ConfigError::invalid("cycle_repeat_limit", "must be at least 1"));
        }
        if self.unit_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("unit_timeout_ms", "must be positive when set"));
        }
        Ok(())
    }

    fn apply_env(&mut self, prefix: &str, env: &dyn EnvSource) -> tooling::Result<()> {
        if let Some(v) = read_parsed(env, &env_key(prefix, "max_iterations"))? {
            self.max_iterations = v;
        }
        if let Some(v) = read_bool(env, &env_key(prefix, "cycle_detection_enabled"))? {
            self.cycle_detection_enabled = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "cycle_repeat_limit"))? {
            self.cycle_repeat_limit = v;
        }
        if let Some(v) = read_parsed(env, &env_key(prefix, "unit_timeout_ms"))? {
            self.unit_timeout_ms = Some(v);
        }
        Ok(())
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        let defaults = Self::default();
        if other.max_iterations != defaults.max_iterations {
            self.max_iterations = other.max_iterations;
        }
        if other.cycle_detection_enabled != defaults.cycle_detection_enabled {
            self.cycle_detection_enabled = other.cycle_detection_enabled;
        }
        if other.cycle_repeat_limit != defaults.cycle_repeat_limit {
            self.cycle_repeat_limit = other.cycle_repeat_limit;
        }
        if other.unit_timeout_ms.is_some() {
            self.unit_timeout_ms = other.unit_timeout_ms;
        }
        self
    }
}

/// Engine and learning settings loaded together
///
/// In YAML the two halves are separate sections:
///
/// ```yaml
/// engine:
///   max_iterations: 40
/// learning:
///   exploration_rate: 0.2
/// ```
///
/// From the environment, engine keys use `ROUTEGRAPH_` and learning keys
/// `ROUTEGRAPH_RL_`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteGraphConfig {
    pub engine: EngineConfig,
    pub learning: LearningConfig,
}

impl ConfigBuilder for RouteGraphConfig {
    fn validate(&self) -> tooling::Result<()> {
        self.engine.validate()?;
        self.learning.validate()
    }

    fn apply_env(&mut self, prefix: &str, env: &dyn EnvSource) -> tooling::Result<()> {
        self.engine.apply_env(prefix, env)?;
        self.learning.apply_env(&format!("{}RL_", prefix), env)
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        self.engine.merge(other.engine);
        self.learning.merge(other.learning);
        self
    }
}

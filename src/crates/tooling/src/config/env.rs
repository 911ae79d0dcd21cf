//! Environment variable sources and typed readers

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// A place environment-style variables are read from
///
/// [`ProcessEnv`] reads the real process environment. [`MapEnv`] holds an
/// in-memory table so tests never mutate global state.
pub trait EnvSource {
    /// Look up a variable; `Ok(None)` when it is not set
    fn var(&self, key: &str) -> Result<Option<String>>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Result<Option<String>> {
        match std::env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key.to_string())),
        }
    }
}

/// An in-memory variable table
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Result<Option<String>> {
        Ok(self.vars.get(key).cloned())
    }
}

/// Build `{PREFIX}{FIELD}` with the field upper-cased
pub fn env_key(prefix: &str, field: &str) -> String {
    format!("{}{}", prefix, field.to_uppercase())
}

/// Read a raw string value
pub fn read_string(env: &dyn EnvSource, key: &str) -> Result<Option<String>> {
    env.var(key)
}

/// Read and parse a value, rejecting anything that fails `FromStr`
pub fn read_parsed<T>(env: &dyn EnvSource, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.var(key)? {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, format!("cannot parse '{}': {}", raw, e))),
        None => Ok(None),
    }
}

/// Read a boolean flag
///
/// Accepts `true/false`, `1/0`, `yes/no`, `on/off` in any case.
pub fn read_bool(env: &dyn EnvSource, key: &str) -> Result<Option<bool>> {
    let Some(raw) = env.var(key)? else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::invalid(key, format!("'{}' is not a boolean", raw))),
    }
}

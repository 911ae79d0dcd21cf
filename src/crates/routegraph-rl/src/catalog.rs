//! Action catalog and action outcomes

use crate::error::{LearningError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, independently invokable capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    /// Relative cost hint; informational, not used by selection
    #[serde(default)]
    pub cost: f64,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            cost: 0.0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// Ordered registry of actions a unit may choose from
///
/// Declaration order is significant: exploitation breaks Q-value ties by it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionCatalog {
    actions: Vec<ActionSpec>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from bare names
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::new();
        for name in names {
            catalog.register(ActionSpec::new(name, ""))?;
        }
        Ok(catalog)
    }

    /// Add an action; names must be unique and non-empty
    pub fn register(&mut self, spec: ActionSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(LearningError::catalog("action name cannot be empty"));
        }
        if self.contains(&spec.name) {
            return Err(LearningError::catalog(format!("action '{}' is already registered", spec.name)));
        }
        self.actions.push(spec);
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_action(mut self, name: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        self.register(ActionSpec::new(name, description))?;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Declaration index of an action
    pub fn position(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What invoking an action produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action returned a payload (which may still describe a failure)
    Success(Value),
    /// The action itself failed
    Failure(String),
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Payload rendered for history and prompts
    pub fn render(&self) -> String {
        match self {
            Self::Success(Value::String(s)) => s.clone(),
            Self::Success(v) => v.to_string(),
            Self::Failure(e) => format!("Error: {}", e),
        }
    }
}

//! The execution state threaded through every step of a traversal
//!
//! - `history` is append-only: units add messages, nothing removes or reorders them
//! - `next` is written only by the executor, from the directive a unit returns
//! - `plan` is an opaque, read-mostly payload (usually produced by a planner)
//! - `context` is namespaced by producer: every key lives under the name of
//!   the unit that wrote it
//! - `progress` is a marker units advance when they complete real work; the
//!   cycle guard treats an unchanged marker as "no progress"

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Terminal sentinel for routing
pub const END: &str = "__end__";

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub role: Role,
    /// Producing unit or tool, when not the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            name: None,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            name: None,
            content: content.into(),
        }
    }

    /// A message attributed to a unit
    pub fn from_unit(unit: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            name: Some(unit.into()),
            content: content.into(),
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            name: Some(name.into()),
            content: content.into(),
        }
    }
}

/// Where the traversal goes next
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "unit", rename_all = "snake_case")]
pub enum Next {
    /// Not started
    #[default]
    Pending,
    Unit(String),
    End,
}

impl Next {
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::Unit(name) => Some(name),
            _ => None,
        }
    }
}

/// Changes carried by a routing directive, applied by the executor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateDelta {
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Written under the producing unit's namespace
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub plan: Option<Value>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.context.is_empty() && self.plan.is_none()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_plan(mut self, plan: Value) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// Shared mutable record for one traversal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    history: Vec<Message>,
    next: Next,
    plan: Option<Value>,
    context: BTreeMap<String, BTreeMap<String, Value>>,
    progress: u64,
    answer: Option<String>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state holding a single user query
    pub fn with_query(query: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.push_message(Message::user(query));
        state
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn push_message(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }

    /// Most recent user message; the query units act on
    pub fn last_user_message(&self) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.role == Role::User)
    }

    /// Messages attributed to a unit
    pub fn messages_from<'a>(&'a self, unit: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.history.iter().filter(move |m| m.name.as_deref() == Some(unit))
    }

    pub fn next(&self) -> &Next {
        &self.next
    }

    pub(crate) fn set_next(&mut self, next: Next) {
        self.next = next;
    }

    pub fn plan(&self) -> Option<&Value> {
        self.plan.as_ref()
    }

    pub fn set_plan(&mut self, plan: Value) {
        self.plan = Some(plan);
    }

    pub fn context(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.context.get(namespace).and_then(|ns| ns.get(key))
    }

    pub fn context_namespace(&self, namespace: &str) -> Option<&BTreeMap<String, Value>> {
        self.context.get(namespace)
    }

    pub fn set_context(&mut self, namespace: &str, key: impl Into<String>, value: Value) {
        self.context
            .entry(namespace.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    pub fn remove_context(&mut self, namespace: &str, key: &str) -> Option<Value> {
        let ns = self.context.get_mut(namespace)?;
        let removed = ns.remove(key);
        if ns.is_empty() {
            self.context.remove(namespace);
        }
        removed
    }

    /// All namespaced context, for fingerprinting and inspection
    pub fn all_context(&self) -> &BTreeMap<String, BTreeMap<String, Value>> {
        &self.context
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Record that real work was completed in this step
    pub fn mark_progress(&mut self) {
        self.progress += 1;
    }

    /// Final answer, once a terminal directive was reached
    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub(crate) fn set_answer(&mut self, answer: Option<String>) {
        self.answer = answer;
    }

    pub(crate) fn take_answer(&mut self) -> Option<String> {
        self.answer.take()
    }

    /// Apply a directive's delta on behalf of `unit`
    pub(crate) fn apply_delta(&mut self, unit: &str, delta: StateDelta) {
        self.history.extend(delta.messages);
        for (key, value) in delta.context {
            self.set_context(unit, key, value);
        }
        if let Some(plan) = delta.plan {
            self.plan = Some(plan);
        }
    }
}

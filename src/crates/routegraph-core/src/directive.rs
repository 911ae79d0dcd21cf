//! Routing directives: what a unit decided after processing the state
//!
//! Units written in Rust return a [`Directive`] directly. Decisions coming
//! from an oracle arrive as loosely typed JSON and go through
//! [`Directive::from_value`], which accepts exactly two shapes:
//!
//! ```json
//! {"terminal": true, "answer": "Paris is the capital of France."}
//! {"terminal": false, "next": "research_team", "state_delta": {"context": {"topic": "capitals"}}}
//! ```
//!
//! `terminal` may be omitted on the routing form, and `stateDelta` is
//! accepted as an alias. A routing form whose `next` is `FINISH` or
//! [`END`] is read as terminal. Anything else, including unknown fields, is
//! rejected as [`RouteError::InvalidRoutingDirective`].

use crate::error::{Result, RouteError};
use crate::state::{StateDelta, END};
use serde::Deserialize;
use serde_json::Value;

/// Routing keyword an oracle uses to say "we are done"
pub const FINISH: &str = "FINISH";

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Stop the traversal with a final answer
    Terminal { answer: String },
    /// Continue at `next` after applying `delta`
    Route { next: String, delta: StateDelta },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDirective {
    #[serde(default)]
    terminal: Option<bool>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default, alias = "stateDelta")]
    state_delta: Option<StateDelta>,
}

impl Directive {
    pub fn terminal(answer: impl Into<String>) -> Self {
        Self::Terminal { answer: answer.into() }
    }

    pub fn route(next: impl Into<String>) -> Self {
        Self::Route {
            next: next.into(),
            delta: StateDelta::default(),
        }
    }

    pub fn route_with(next: impl Into<String>, delta: StateDelta) -> Self {
        Self::Route {
            next: next.into(),
            delta,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    /// Name of the unit this directive routes to, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Route { next, .. } => Some(next),
            Self::Terminal { .. } => None,
        }
    }

    /// Parse an untrusted decision produced on behalf of `unit`
    pub fn from_value(unit: &str, value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(RouteError::invalid_directive(
                unit,
                format!("expected an object, got {}", kind_of(value)),
            ));
        }

        let raw: RawDirective = serde_json::from_value(value.clone())
            .map_err(|e| RouteError::invalid_directive(unit, format!("unrecognized directive shape: {}", e)))?;

        match raw {
            RawDirective {
                terminal: Some(true),
                answer: Some(answer),
                next: None,
                state_delta: None,
            } => Ok(Self::Terminal { answer }),
            RawDirective {
                terminal: Some(true), ..
            } => Err(RouteError::invalid_directive(
                unit,
                "a terminal directive carries an answer and nothing else",
            )),
            RawDirective {
                terminal: None | Some(false),
                answer: None,
                next: Some(next),
                state_delta,
            } => {
                let next = next.trim();
                if next.is_empty() {
                    return Err(RouteError::invalid_directive(unit, "empty 'next'"));
                }
                if next == FINISH || next == END {
                    if state_delta.is_some_and(|d| !d.is_empty()) {
                        return Err(RouteError::invalid_directive(
                            unit,
                            "a finishing directive cannot carry a state delta",
                        ));
                    }
                    return Ok(Self::Terminal { answer: String::new() });
                }
                Ok(Self::Route {
                    next: next.to_string(),
                    delta: state_delta.unwrap_or_default(),
                })
            }
            _ => Err(RouteError::invalid_directive(
                unit,
                "expected {terminal: true, answer} or {next, state_delta}",
            )),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

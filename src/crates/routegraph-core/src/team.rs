//! Teams: a whole routing graph used as a single unit
//!
//! A [`Team`] owns an inner [`RoutingGraph`] (usually a supervisor with a
//! few workers) and its own bounded [`GraphExecutor`]. From the outside it is
//! an ordinary [`Unit`]: one step in the parent traversal, however many
//! steps it takes inside.
//!
//! The inner traversal starts from a copy of the parent state. When it
//! completes, its state replaces the parent's (history stays append-only
//! because the copy already held the parent history), its answer is posted
//! as a message from the team, and control returns to the parent's
//! supervisor. When it fails, the parent keeps the partial inner state for
//! diagnostics and the failure surfaces as a unit error of the team.

use crate::directive::Directive;
use crate::error::{Result, RouteError};
use crate::executor::GraphExecutor;
use crate::graph::RoutingGraph;
use crate::state::{ExecutionState, Message};
use crate::unit::{Routes, Unit};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Default unit a team hands control back to
pub const DEFAULT_RETURN_TO: &str = "supervisor";

pub struct Team {
    name: String,
    graph: Arc<RoutingGraph>,
    executor: GraphExecutor,
    return_to: Option<String>,
}

impl Team {
    pub fn new(name: impl Into<String>, graph: RoutingGraph, executor: GraphExecutor) -> Self {
        Self {
            name: name.into(),
            graph: Arc::new(graph),
            executor,
            return_to: Some(DEFAULT_RETURN_TO.to_string()),
        }
    }

    /// Unit to route to after the inner traversal completes
    pub fn with_return_to(mut self, unit: impl Into<String>) -> Self {
        self.return_to = Some(unit.into());
        self
    }

    /// End the parent traversal with the team's answer instead of routing on
    pub fn terminal(mut self) -> Self {
        self.return_to = None;
        self
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }
}

impl fmt::Debug for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Team")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .field("return_to", &self.return_to)
            .finish()
    }
}

#[async_trait]
impl Unit for Team {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, state: &mut ExecutionState) -> Result<Directive> {
        match self.executor.run(&self.graph, state.clone()).await {
            Ok(traversal) => {
                debug!(team = %self.name, steps = traversal.steps, "team finished");
                let mut inner = traversal.state;
                let answer = inner.take_answer();
                *state = inner;

                state.set_context(&self.name, "steps", json!(traversal.steps));
                state.set_context(&self.name, "path", json!(traversal.path));
                if let Some(answer) = &answer {
                    state.push_message(Message::from_unit(&self.name, answer.clone()));
                    state.set_context(&self.name, "answer", Value::String(answer.clone()));
                }
                state.mark_progress();

                Ok(match &self.return_to {
                    Some(next) => Directive::route(next.clone()),
                    None => Directive::terminal(answer.unwrap_or_default()),
                })
            }
            Err(failure) => {
                let mut inner = *failure.state;
                inner.take_answer();
                *state = inner;
                Err(RouteError::unit_execution(&self.name, failure.error))
            }
        }
    }

    fn routes(&self) -> Routes {
        Routes::Static(self.return_to.iter().cloned().collect())
    }
}

//! Supervisor units: dynamic branching among a set of members

use crate::directive::Directive;
use crate::error::{Result, RouteError};
use crate::oracle::{consult, DecisionOracle};
use crate::state::{ExecutionState, Message};
use crate::unit::{Routes, Unit};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Context key holding the supervisor's draft answer when it hands off to a
/// finishing unit
pub const DRAFT_ANSWER_KEY: &str = "draft_answer";

/// Routes between members by consulting an oracle
///
/// The oracle may only pick a member. When it decides the work is done, the
/// traversal ends, or, if a finish route is set, continues at that unit
/// (typically a response generator) with the draft answer left in context.
pub struct SupervisorUnit {
    name: String,
    oracle: Arc<dyn DecisionOracle>,
    members: Vec<String>,
    finish_route: Option<String>,
}

impl SupervisorUnit {
    pub fn new<I, S>(name: impl Into<String>, oracle: Arc<dyn DecisionOracle>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            oracle,
            members: members.into_iter().map(Into::into).collect(),
            finish_route: None,
        }
    }

    /// Continue at `unit` instead of ending when the oracle finishes
    pub fn with_finish_route(mut self, unit: impl Into<String>) -> Self {
        self.finish_route = Some(unit.into());
        self
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn finish_route(&self) -> Option<&str> {
        self.finish_route.as_deref()
    }
}

impl fmt::Debug for SupervisorUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorUnit")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("finish_route", &self.finish_route)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Unit for SupervisorUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, state: &mut ExecutionState) -> Result<Directive> {
        let directive = consult(self.oracle.as_ref(), &self.name, state, &self.members).await?;

        match directive {
            Directive::Route { ref next, .. } if !self.members.contains(next) => Err(RouteError::invalid_directive(
                &self.name,
                format!("'{}' is not a member of this supervisor", next),
            )),
            Directive::Route { next, delta } => {
                debug!(supervisor = %self.name, member = %next, "delegating");
                state.push_message(Message::from_unit(&self.name, format!("Routing to {}", next)));
                Ok(Directive::route_with(next, delta))
            }
            Directive::Terminal { answer } => match &self.finish_route {
                Some(finish) => {
                    debug!(supervisor = %self.name, finish = %finish, "work complete, handing off");
                    if !answer.is_empty() {
                        state.set_context(&self.name, DRAFT_ANSWER_KEY, Value::String(answer));
                    }
                    Ok(Directive::route(finish.clone()))
                }
                None => Ok(Directive::Terminal { answer }),
            },
        }
    }

    fn routes(&self) -> Routes {
        let mut targets = self.members.clone();
        if let Some(finish) = &self.finish_route {
            if !targets.contains(finish) {
                targets.push(finish.clone());
            }
        }
        Routes::Supervised(targets)
    }
}

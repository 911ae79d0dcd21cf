//! Decision oracle interfaces
//!
//! The oracle is whatever decides where a traversal goes next, usually a
//! language model behind a prompt. The engine treats it as an opaque,
//! untrusted function: its output is plain JSON that is always parsed with
//! [`Directive::from_value`] and validated against the graph before use.
//!
//! Two invocation styles are supported:
//!
//! - [`DecisionOracle`]: async, cancelable by dropping the future
//! - [`BlockingOracle`]: synchronous; wrap it in [`Blocking`] to run it on
//!   tokio's blocking pool so it never stalls the executor

use crate::directive::Directive;
use crate::error::{Result, RouteError};
use crate::state::ExecutionState;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What the oracle is asked to decide on
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    /// Unit consulting the oracle
    pub unit: &'a str,
    pub state: &'a ExecutionState,
    /// Units the decision may route to; empty when unrestricted
    pub members: &'a [String],
}

impl DecisionRequest<'_> {
    pub fn into_owned(self) -> OwnedDecisionRequest {
        OwnedDecisionRequest {
            unit: self.unit.to_string(),
            state: self.state.clone(),
            members: self.members.to_vec(),
        }
    }
}

/// A [`DecisionRequest`] that can cross a thread boundary
#[derive(Debug, Clone)]
pub struct OwnedDecisionRequest {
    pub unit: String,
    pub state: ExecutionState,
    pub members: Vec<String>,
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Decide on the next step, returning a raw directive
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Value>;
}

/// Synchronous oracle, for hosts whose model client blocks
pub trait BlockingOracle: Send + Sync + 'static {
    fn decide_blocking(&self, request: OwnedDecisionRequest) -> Result<Value>;
}

/// Runs a [`BlockingOracle`] on the blocking thread pool
pub struct Blocking<O> {
    inner: Arc<O>,
}

impl<O: BlockingOracle> Blocking<O> {
    pub fn new(oracle: O) -> Self {
        Self { inner: Arc::new(oracle) }
    }
}

impl<O> fmt::Debug for Blocking<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocking").finish_non_exhaustive()
    }
}

#[async_trait]
impl<O: BlockingOracle> DecisionOracle for Blocking<O> {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Value> {
        let oracle = Arc::clone(&self.inner);
        let owned = request.into_owned();
        let unit = owned.unit.clone();

        tokio::task::spawn_blocking(move || oracle.decide_blocking(owned))
            .await
            .map_err(|e| RouteError::unit_execution(unit, format!("blocking oracle task failed: {}", e)))?
    }
}

type DecideFn = dyn Fn(DecisionRequest<'_>) -> Result<Value> + Send + Sync;

/// Oracle backed by a plain closure
///
/// Handy for rule-based routing and for tests.
pub struct FnOracle {
    func: Box<DecideFn>,
}

impl FnOracle {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(DecisionRequest<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self { func: Box::new(func) }
    }
}

impl fmt::Debug for FnOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOracle").finish_non_exhaustive()
    }
}

#[async_trait]
impl DecisionOracle for FnOracle {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Value> {
        (self.func)(request)
    }
}

/// Ask `oracle` for a decision and parse it into a [`Directive`]
///
/// Oracle failures become [`RouteError::UnitExecution`]; malformed output
/// becomes [`RouteError::InvalidRoutingDirective`].
pub async fn consult(
    oracle: &dyn DecisionOracle,
    unit: &str,
    state: &ExecutionState,
    members: &[String],
) -> Result<Directive> {
    let request = DecisionRequest { unit, state, members };
    let raw = oracle.decide(request).await.map_err(|e| match e {
        e if e.is_unit_failure() => e,
        RouteError::Cancelled => RouteError::Cancelled,
        other => RouteError::unit_execution(unit, other),
    })?;
    Directive::from_value(unit, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl BlockingOracle for Echo {
        fn decide_blocking(&self, request: OwnedDecisionRequest) -> Result<Value> {
            Ok(json!({"next": request.members[0].clone()}))
        }
    }

    #[tokio::test]
    async fn test_blocking_adapter() {
        let oracle = Blocking::new(Echo);
        let state = ExecutionState::with_query("q");
        let members = vec!["search".to_string()];

        let directive = consult(&oracle, "sup", &state, &members).await.unwrap();
        assert_eq!(directive, Directive::route("search"));
    }

    #[tokio::test]
    async fn test_oracle_failure_is_unit_failure() {
        let oracle = FnOracle::new(|_| Err(RouteError::validation("model unavailable")));
        let state = ExecutionState::new();

        let err = consult(&oracle, "sup", &state, &[]).await.unwrap_err();
        assert!(matches!(err, RouteError::UnitExecution { ref unit, .. } if unit == "sup"));
    }

    #[tokio::test]
    async fn test_malformed_output_is_invalid_directive() {
        let oracle = FnOracle::new(|_| Ok(json!({"route_to": "x"})));
        let state = ExecutionState::new();

        let err = consult(&oracle, "sup", &state, &[]).await.unwrap_err();
        assert!(matches!(err, RouteError::InvalidRoutingDirective { .. }));
    }
}

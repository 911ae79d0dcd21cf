//! The graph executor
//!
//! [`GraphExecutor`] drives one [`ExecutionState`] through a compiled
//! [`RoutingGraph`], one unit at a time:
//!
//! ```text
//!   ┌──────────────┐   admit?   ┌─────────────┐  directive  ┌───────────────┐
//!   │ current unit │ ─────────► │ GuardSession│ ──────────► │ unit.process  │
//!   └──────────────┘            └─────────────┘             └───────┬───────┘
//!          ▲                                                        │
//!          │      Route { next, delta }: check_route, apply delta   │
//!          └────────────────────────────────────────────────────────┤
//!                                                                   │
//!                 Terminal { answer } or next == END: stop  ◄───────┘
//! ```
//!
//! Steps are strictly sequential. The executor keeps nothing between runs,
//! so a single instance can serve any number of concurrent traversals.
//!
//! Failures come back as a [`TraversalError`] carrying the partial state and
//! the path taken. Unit failures are never retried here. After the loop,
//! [`Unit::on_traversal_end`] runs once for every unit entered; a hook error
//! turns an otherwise completed traversal into a failure, and is only logged
//! when the traversal had already failed.

use crate::config::EngineConfig;
use crate::directive::Directive;
use crate::error::{Result, RouteError, TerminationReason, TraversalError};
use crate::graph::RoutingGraph;
use crate::guard::CycleGuard;
use crate::state::{ExecutionState, Next, END};
use crate::unit::Unit;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tooling::config::ConfigBuilder;
use tooling::logging::{format_duration, LogGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a traversal
pub type TraversalResult = std::result::Result<Traversal, TraversalError>;

/// A traversal that reached a terminal directive
#[derive(Debug, Clone)]
pub struct Traversal {
    pub state: ExecutionState,
    pub reason: TerminationReason,
    /// Units entered, in order
    pub path: Vec<String>,
    pub steps: usize,
    pub run_id: Uuid,
}

impl Traversal {
    pub fn answer(&self) -> Option<&str> {
        self.state.answer()
    }
}

#[derive(Debug, Clone)]
pub struct GraphExecutor {
    config: EngineConfig,
    guard: CycleGuard,
}

impl GraphExecutor {
    /// Executor with validated settings
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let guard = CycleGuard::new(&config);
        Ok(Self { config, guard })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn run(&self, graph: &RoutingGraph, state: ExecutionState) -> TraversalResult {
        self.run_with_cancellation(graph, state, CancellationToken::new()).await
    }

    /// Run until done, a bound is hit, a unit fails, or `cancel` fires
    ///
    /// Cancellation is checked before every step and raced against the unit
    /// invocation in flight.
    pub async fn run_with_cancellation(
        &self,
        graph: &RoutingGraph,
        mut state: ExecutionState,
        cancel: CancellationToken,
    ) -> TraversalResult {
        let run_id = Uuid::new_v4();
        let timer = LogGuard::new(format!("traversal {}", run_id));
        let mut session = self.guard.session();
        let mut visited: Vec<Arc<dyn Unit>> = Vec::new();
        let mut current = graph.entry().to_string();
        let mut steps = 0usize;

        state.set_answer(None);
        state.set_next(Next::Unit(current.clone()));

        let mut outcome: Result<()> = loop {
            if cancel.is_cancelled() {
                break Err(RouteError::Cancelled);
            }
            if let Err(e) = session.check(&current, &state) {
                break Err(e);
            }

            let Some(unit) = graph.unit(&current).cloned() else {
                break Err(RouteError::validation(format!("unit '{}' is not registered", current)));
            };
            if !visited.iter().any(|u| u.name() == current) {
                visited.push(Arc::clone(&unit));
            }

            debug!(run = %run_id, step = steps, unit = %current, "invoking unit");
            let result = self.invoke(unit.as_ref(), &mut state, &cancel).await;
            steps += 1;

            match result {
                Err(e) => break Err(e),
                Ok(Directive::Terminal { answer }) => {
                    state.set_answer((!answer.is_empty()).then_some(answer));
                    state.set_next(Next::End);
                    break Ok(());
                }
                Ok(Directive::Route { next, delta }) => {
                    if next == END {
                        state.apply_delta(&current, delta);
                        state.set_next(Next::End);
                        break Ok(());
                    }
                    if let Err(e) = graph.check_route(&current, &next) {
                        warn!(run = %run_id, unit = %current, next = %next, "rejected routing directive");
                        break Err(e);
                    }
                    state.apply_delta(&current, delta);
                    state.set_next(Next::Unit(next.clone()));
                    current = next;
                }
            }
        };

        // Every hook runs; a failure fails a traversal that would otherwise complete
        for unit in &visited {
            if let Err(e) = unit.on_traversal_end(&mut state).await {
                warn!(run = %run_id, unit = %unit.name(), error = %e, "traversal end hook failed");
                if outcome.is_ok() {
                    outcome = Err(Self::classify(unit.name(), e));
                }
            }
        }

        let path = session.into_path();
        match outcome {
            Ok(()) => {
                info!(
                    run = %run_id,
                    steps,
                    elapsed = %format_duration(timer.elapsed()),
                    "traversal completed"
                );
                Ok(Traversal {
                    state,
                    reason: TerminationReason::Completed,
                    path,
                    steps,
                    run_id,
                })
            }
            Err(error) => {
                let failure = TraversalError {
                    error,
                    state: Box::new(state),
                    path,
                    steps,
                };
                warn!(
                    run = %run_id,
                    steps,
                    reason = ?failure.reason(),
                    error = %failure.error,
                    "traversal stopped"
                );
                Err(failure)
            }
        }
    }

    /// Run on a private current-thread runtime, for synchronous hosts
    ///
    /// Must not be called from inside an async runtime.
    pub fn run_blocking(&self, graph: &RoutingGraph, state: ExecutionState) -> TraversalResult {
        let fail = |error: RouteError, state: ExecutionState| TraversalError {
            error,
            state: Box::new(state),
            path: Vec::new(),
            steps: 0,
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(fail(
                RouteError::Runtime("run_blocking called inside an async runtime; use run".into()),
                state,
            ));
        }
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => return Err(fail(RouteError::Runtime(e.to_string()), state)),
        };
        runtime.block_on(self.run(graph, state))
    }

    async fn invoke(
        &self,
        unit: &dyn Unit,
        state: &mut ExecutionState,
        cancel: &CancellationToken,
    ) -> Result<Directive> {
        let name = unit.name();
        let call = async {
            match self.config.unit_timeout() {
                Some(limit) => match tokio::time::timeout(limit, unit.process(state)).await {
                    Ok(result) => result,
                    Err(_) => Err(RouteError::Timeout {
                        unit: name.to_string(),
                        timeout: limit,
                    }),
                },
                None => unit.process(state).await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RouteError::Cancelled),
            result = call => result,
        };

        result.map_err(|e| Self::classify(name, e))
    }

    fn classify(unit: &str, error: RouteError) -> RouteError {
        match error {
            e if e.is_unit_failure() => e,
            RouteError::Cancelled => RouteError::Cancelled,
            other => RouteError::unit_execution(unit, other),
        }
    }
}

//! Error types for graph construction and traversal
//!
//! ```text
//! RouteError
//! ├── StructuralCycle          - Build-time: unguarded cycle in static routes
//! ├── Validation               - Build-time: missing units, bad edges, bad entry
//! ├── Configuration            - Out-of-range engine parameters
//! ├── MaxIterationsExceeded    - Runtime step bound hit
//! ├── CycleDetected            - Runtime loop heuristic fired
//! ├── UnitExecution            - A unit failed (oracle error, action error)
//! ├── InvalidRoutingDirective  - A unit routed somewhere it may not go
//! ├── Timeout                  - A single unit invocation ran too long
//! ├── Cancelled                - The caller abandoned the traversal
//! ├── Learning                 - Learning subsystem failure outside a unit
//! └── Runtime                  - The async runtime could not be started
//! ```
//!
//! `InvalidRoutingDirective` and `Timeout` are unit failures too; see
//! [`RouteError::is_unit_failure`].
//!
//! Traversal failures reach the caller as a [`TraversalError`], which keeps
//! the partial [`ExecutionState`] and the path taken for diagnostics.

use crate::state::ExecutionState;
use routegraph_rl::LearningError;
use std::time::Duration;
use thiserror::Error;
use tooling::ConfigError;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RouteError>;

#[derive(Error, Debug)]
pub enum RouteError {
    /// The static routes contain a cycle that does not pass through the supervisor
    #[error("Structural cycle not mediated by the supervisor: {}", path.join(" -> "))]
    StructuralCycle {
        /// Units forming the cycle, first unit repeated at the end
        path: Vec<String>,
    },

    #[error("Graph validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Maximum iterations ({limit}) exceeded")]
    MaxIterationsExceeded { limit: usize },

    /// The same unit was reached with an unchanged context too many times
    #[error("Cycle detected at unit '{unit}': reached {repeats} times without progress ({})", pattern.join(" -> "))]
    CycleDetected {
        unit: String,
        repeats: usize,
        /// Tail of the path showing the repeating pattern
        pattern: Vec<String>,
    },

    #[error("Unit '{unit}' execution failed: {error}")]
    UnitExecution { unit: String, error: String },

    #[error("Invalid routing directive from unit '{unit}': {reason}")]
    InvalidRoutingDirective { unit: String, reason: String },

    #[error("Unit '{unit}' timed out after {}ms", timeout.as_millis())]
    Timeout { unit: String, timeout: Duration },

    #[error("Traversal cancelled")]
    Cancelled,

    #[error("Learning error: {0}")]
    Learning(#[from] LearningError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl RouteError {
    pub fn unit_execution(unit: impl Into<String>, error: impl ToString) -> Self {
        Self::UnitExecution {
            unit: unit.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_directive(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRoutingDirective {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors that mean a unit misbehaved or failed
    pub fn is_unit_failure(&self) -> bool {
        matches!(
            self,
            Self::UnitExecution { .. } | Self::InvalidRoutingDirective { .. } | Self::Timeout { .. }
        )
    }

    /// True for errors raised by the step bound or loop heuristic
    pub fn is_bound_exceeded(&self) -> bool {
        matches!(self, Self::MaxIterationsExceeded { .. } | Self::CycleDetected { .. })
    }
}

/// Why a traversal stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// A terminal directive was reached
    Completed,
    MaxIterationsExceeded,
    CycleDetected,
    UnitFailed,
    Cancelled,
}

/// A failed traversal: the error plus everything known at the point of failure
#[derive(Error, Debug)]
#[error("{error} (after {steps} steps)")]
pub struct TraversalError {
    #[source]
    pub error: RouteError,
    /// State as it was when the traversal stopped
    pub state: Box<ExecutionState>,
    /// Units entered, in order
    pub path: Vec<String>,
    /// Unit invocations that ran to completion or failure
    pub steps: usize,
}

impl TraversalError {
    pub fn reason(&self) -> TerminationReason {
        match &self.error {
            RouteError::MaxIterationsExceeded { .. } => TerminationReason::MaxIterationsExceeded,
            RouteError::CycleDetected { .. } => TerminationReason::CycleDetected,
            RouteError::Cancelled => TerminationReason::Cancelled,
            _ => TerminationReason::UnitFailed,
        }
    }

    pub fn into_error(self) -> RouteError {
        self.error
    }
}

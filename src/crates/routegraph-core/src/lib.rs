//! # routegraph-core
//!
//! An adaptive routing engine: a graph of named units that pass a shared
//! [`ExecutionState`] along a path chosen at run time, usually by a
//! decision oracle (a language model) consulted by a supervisor.
//!
//! ## Pieces
//!
//! - [`Unit`]: one step. Plain closures ([`FnUnit`]), oracle routers
//!   ([`OracleUnit`]), supervisors ([`SupervisorUnit`]), nested graphs
//!   ([`Team`]) and learning tool users ([`LearningTeam`]) all share it.
//! - [`Directive`]: what a unit decided; oracle output is parsed into it and
//!   anything unrecognized is rejected.
//! - [`RoutingGraph`]: units plus entry point and supervisor, validated at
//!   compile time (including structural cycles).
//! - [`GraphExecutor`]: runs a traversal step by step under a
//!   [`CycleGuard`], with per-unit timeouts and cancellation.
//! - [`HierarchyBuilder`]: the coordinator → planner → supervisor ⇄ teams →
//!   generator layout.
//!
//! ## Example
//!
//! ```rust
//! use routegraph_core::{Directive, EngineConfig, ExecutionState, FnUnit, GraphExecutor, Message, RoutingGraph};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let mut builder = RoutingGraph::builder();
//! builder
//!     .add_unit(FnUnit::new("greet", |state| {
//!         state.push_message(Message::from_unit("greet", "hello"));
//!         Ok(Directive::route("close"))
//!     }))
//!     .add_unit(FnUnit::new("close", |_| Ok(Directive::terminal("bye"))))
//!     .set_entry("greet");
//! let graph = builder.compile()?;
//!
//! let executor = GraphExecutor::new(EngineConfig::default())?;
//! let traversal = executor.run(&graph, ExecutionState::with_query("hi")).await?;
//! assert_eq!(traversal.answer(), Some("bye"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod directive;
pub mod error;
pub mod executor;
pub mod graph;
pub mod guard;
pub mod hierarchy;
pub mod learning_team;
pub mod oracle;
pub mod state;
pub mod supervisor;
pub mod team;
pub mod unit;

pub use config::{EngineConfig, RouteGraphConfig};
pub use directive::{Directive, FINISH};
pub use error::{Result, RouteError, TerminationReason, TraversalError};
pub use executor::{GraphExecutor, Traversal, TraversalResult};
pub use graph::{RoutingGraph, RoutingGraphBuilder};
pub use guard::{CycleGuard, GuardSession};
pub use hierarchy::HierarchyBuilder;
pub use learning_team::{ActionInvoker, ActionRegistry, EpisodeMode, LearningTeam};
pub use oracle::{consult, Blocking, BlockingOracle, DecisionOracle, DecisionRequest, FnOracle, OwnedDecisionRequest};
pub use state::{ExecutionState, Message, Next, Role, StateDelta, END};
pub use supervisor::SupervisorUnit;
pub use team::Team;
pub use unit::{FnUnit, OracleUnit, Routes, Unit};

pub use tokio_util::sync::CancellationToken;

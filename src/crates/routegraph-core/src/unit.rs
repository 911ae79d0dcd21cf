//! The unit abstraction
//!
//! Every step of a routing graph, whether a plain handler, an oracle-driven
//! router, a supervisor or a whole team, implements the same [`Unit`]
//! contract: take the state, mutate it, return a [`Directive`].

use crate::directive::Directive;
use crate::error::{Result, RouteError};
use crate::oracle::{consult, DecisionOracle};
use crate::state::ExecutionState;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Where a unit may route, as far as can be known before running it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Routes {
    /// Unknown until run time; validated against the graph on every step
    #[default]
    Dynamic,
    /// A fixed set of targets. Empty means the unit only ever terminates.
    Static(Vec<String>),
    /// Dynamic branching among members; the one legitimate source of
    /// repeated visits
    Supervised(Vec<String>),
}

impl Routes {
    pub fn targets(&self) -> &[String] {
        match self {
            Self::Dynamic => &[],
            Self::Static(targets) | Self::Supervised(targets) => targets,
        }
    }

    pub fn is_supervised(&self) -> bool {
        matches!(self, Self::Supervised(_))
    }

    /// Whether a route to `next` is allowed; `Dynamic` allows any name
    pub fn permits(&self, next: &str) -> bool {
        match self {
            Self::Dynamic => true,
            Self::Static(targets) | Self::Supervised(targets) => targets.iter().any(|t| t == next),
        }
    }
}

#[async_trait]
pub trait Unit: Send + Sync {
    fn name(&self) -> &str;

    /// Process the state and decide the next step
    async fn process(&self, state: &mut ExecutionState) -> Result<Directive>;

    /// Declared routing options, used by structural validation
    fn routes(&self) -> Routes {
        Routes::Dynamic
    }

    /// Called once for every visited unit after the traversal stops
    async fn on_traversal_end(&self, _state: &mut ExecutionState) -> Result<()> {
        Ok(())
    }
}

type UnitFn = dyn Fn(&mut ExecutionState) -> Result<Directive> + Send + Sync;

/// A unit backed by a synchronous closure
pub struct FnUnit {
    name: String,
    func: Box<UnitFn>,
    routes: Routes,
}

impl FnUnit {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut ExecutionState) -> Result<Directive> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
            routes: Routes::Dynamic,
        }
    }

    pub fn with_routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }
}

impl fmt::Debug for FnUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnUnit")
            .field("name", &self.name)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Unit for FnUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, state: &mut ExecutionState) -> Result<Directive> {
        (self.func)(state)
    }

    fn routes(&self) -> Routes {
        self.routes.clone()
    }
}

/// A unit that defers every decision to an oracle
///
/// With `Static` routes the oracle's choice must be one of them; with
/// `Dynamic` routes the executor validates it against the graph.
pub struct OracleUnit {
    name: String,
    oracle: Arc<dyn DecisionOracle>,
    routes: Routes,
}

impl OracleUnit {
    pub fn new(name: impl Into<String>, oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            name: name.into(),
            oracle,
            routes: Routes::Dynamic,
        }
    }

    pub fn with_routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }
}

impl fmt::Debug for OracleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleUnit")
            .field("name", &self.name)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Unit for OracleUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, state: &mut ExecutionState) -> Result<Directive> {
        let directive = consult(self.oracle.as_ref(), &self.name, state, self.routes.targets()).await?;

        if let Some(next) = directive.target() {
            if !self.routes.permits(next) {
                return Err(RouteError::invalid_directive(
                    &self.name,
                    format!("'{}' is not among the declared routes {:?}", next, self.routes.targets()),
                ));
            }
        }
        Ok(directive)
    }

    fn routes(&self) -> Routes {
        self.routes.clone()
    }
}

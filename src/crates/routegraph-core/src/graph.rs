//! Routing graphs
//!
//! A [`RoutingGraph`] is a set of named [`Unit`]s, an entry point, and an
//! optional supervisor responsible for dynamic branching. Graphs are built
//! with [`RoutingGraphBuilder`] and validated once, at
//! [`compile`](RoutingGraphBuilder::compile) time; a compiled graph is
//! immutable and can be shared by any number of concurrent traversals.
//!
//! # Routes
//!
//! Each unit's effective routes are the union of what it declares through
//! [`Unit::routes`] and the edges added on the builder. Edges turn a
//! `Dynamic` unit into a `Static` one:
//!
//! ```text
//!   declared        + edges     = effective
//!   Dynamic         + []        = Dynamic        (any registered unit)
//!   Dynamic         + [b]       = Static([b])
//!   Static([b])     + [c]       = Static([b, c])
//!   Supervised([m]) + [f]       = Supervised([m, f])
//! ```
//!
//! Every route taken at run time is checked against the effective routes
//! with [`RoutingGraph::check_route`].
//!
//! # Example
//!
//! ```rust
//! use routegraph_core::{Directive, FnUnit, RoutingGraph, END};
//!
//! let mut builder = RoutingGraph::builder();
//! builder
//!     .add_unit(FnUnit::new("fetch", |_| Ok(Directive::route("summarize"))))
//!     .add_unit(FnUnit::new("summarize", |_| Ok(Directive::terminal("done"))))
//!     .add_edge("fetch", "summarize")
//!     .add_edge("summarize", END)
//!     .set_entry("fetch");
//!
//! let graph = builder.compile().unwrap();
//! assert_eq!(graph.entry(), "fetch");
//! ```

use crate::error::{Result, RouteError};
use crate::guard::CycleGuard;
use crate::state::END;
use crate::unit::{Routes, Unit};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub struct RoutingGraph {
    units: HashMap<String, Arc<dyn Unit>>,
    routes: HashMap<String, Routes>,
    entry: String,
    supervisor: Option<String>,
}

impl RoutingGraph {
    pub fn builder() -> RoutingGraphBuilder {
        RoutingGraphBuilder::default()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn supervisor(&self) -> Option<&str> {
        self.supervisor.as_deref()
    }

    pub fn unit(&self, name: &str) -> Option<&Arc<dyn Unit>> {
        self.units.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Registered unit names, sorted
    pub fn unit_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.units.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Effective routes of a unit
    pub fn routes(&self, name: &str) -> Option<&Routes> {
        self.routes.get(name)
    }

    /// Statically known targets of a unit, including [`END`]
    pub fn static_routes(&self, name: &str) -> Vec<&str> {
        self.routes
            .get(name)
            .map(|r| r.targets().iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `name` is the designated supervisor or declares supervised routes
    pub fn is_supervising(&self, name: &str) -> bool {
        self.supervisor.as_deref() == Some(name) || self.routes.get(name).is_some_and(Routes::is_supervised)
    }

    /// Validate a route chosen at run time
    ///
    /// `next` must name a registered unit and be permitted by the effective
    /// routes of `from`.
    pub fn check_route(&self, from: &str, next: &str) -> Result<()> {
        if !self.units.contains_key(next) {
            return Err(RouteError::invalid_directive(
                from,
                format!("'{}' is not a registered unit", next),
            ));
        }
        let permitted = self.routes.get(from).map_or(true, |r| r.permits(next));
        if !permitted {
            return Err(RouteError::invalid_directive(
                from,
                format!("'{}' is not among the routes of '{}'", next, from),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for RoutingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingGraph")
            .field("units", &self.unit_names())
            .field("entry", &self.entry)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

#[derive(Default)]
pub struct RoutingGraphBuilder {
    units: Vec<Arc<dyn Unit>>,
    edges: Vec<(String, String)>,
    entry: Option<String>,
    supervisor: Option<String>,
}

impl RoutingGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit<U: Unit + 'static>(&mut self, unit: U) -> &mut Self {
        self.units.push(Arc::new(unit));
        self
    }

    /// Register a unit that is also held elsewhere
    pub fn add_shared(&mut self, unit: Arc<dyn Unit>) -> &mut Self {
        self.units.push(unit);
        self
    }

    /// Declare a static route; `to` may be [`END`]
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn set_entry(&mut self, unit: impl Into<String>) -> &mut Self {
        self.entry = Some(unit.into());
        self
    }

    /// Designate the unit responsible for dynamic branching
    pub fn set_supervisor(&mut self, unit: impl Into<String>) -> &mut Self {
        self.supervisor = Some(unit.into());
        self
    }

    /// Validate and freeze the graph
    pub fn compile(self) -> Result<RoutingGraph> {
        let mut units: HashMap<String, Arc<dyn Unit>> = HashMap::new();
        for unit in self.units {
            let name = unit.name().to_string();
            if name.trim().is_empty() {
                return Err(RouteError::validation("unit names cannot be empty"));
            }
            if name == END {
                return Err(RouteError::validation(format!("'{}' is reserved", END)));
            }
            if units.insert(name.clone(), unit).is_some() {
                return Err(RouteError::validation(format!("duplicate unit '{}'", name)));
            }
        }
        if units.is_empty() {
            return Err(RouteError::validation("graph has no units"));
        }

        let entry = self
            .entry
            .ok_or_else(|| RouteError::validation("entry point not set"))?;
        if !units.contains_key(&entry) {
            return Err(RouteError::validation(format!("entry point '{}' does not exist", entry)));
        }

        let mut routes: HashMap<String, Routes> = units.iter().map(|(name, unit)| (name.clone(), unit.routes())).collect();
        for (from, to) in self.edges {
            let declared = routes
                .get_mut(&from)
                .ok_or_else(|| RouteError::validation(format!("edge source '{}' does not exist", from)))?;
            if *declared == Routes::Dynamic {
                *declared = Routes::Static(Vec::new());
            }
            if let Routes::Static(targets) | Routes::Supervised(targets) = declared {
                if !targets.contains(&to) {
                    targets.push(to);
                }
            }
        }

        for (from, declared) in &routes {
            for target in declared.targets() {
                if target != END && !units.contains_key(target) {
                    return Err(RouteError::validation(format!(
                        "route target '{}' of '{}' does not exist",
                        target, from
                    )));
                }
            }
        }

        if let Some(supervisor) = &self.supervisor {
            match routes.get(supervisor) {
                None => {
                    return Err(RouteError::validation(format!(
                        "supervisor '{}' does not exist",
                        supervisor
                    )))
                }
                Some(Routes::Supervised(_)) => {}
                Some(_) => {
                    return Err(RouteError::validation(format!(
                        "supervisor '{}' does not declare supervised routes",
                        supervisor
                    )))
                }
            }
        }

        let graph = RoutingGraph {
            units,
            routes,
            entry,
            supervisor: self.supervisor,
        };
        CycleGuard::validate_structure(&graph)?;
        Ok(graph)
    }
}

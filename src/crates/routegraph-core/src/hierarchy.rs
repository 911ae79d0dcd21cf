//! Standard hierarchical layout
//!
//! ```text
//!  coordinator ──► planner ──► supervisor ◄──► team_a
//!       │                         │  ▲ ◄─────► team_b
//!       ▼ (simple query)          ▼  └──────── ...
//!      END                    generator ──► END
//! ```
//!
//! The coordinator either answers directly or hands the query to the
//! planner, which writes a plan and passes control to the supervisor. The
//! supervisor delegates to teams until the oracle says the work is done,
//! then hands off to the generator, which always produces the final answer.
//!
//! Every role consults the same oracle unless a role-specific one is given;
//! the oracle can tell roles apart by [`DecisionRequest::unit`](crate::oracle::DecisionRequest).

use crate::error::{Result, RouteError};
use crate::graph::RoutingGraph;
use crate::oracle::DecisionOracle;
use crate::supervisor::SupervisorUnit;
use crate::unit::{OracleUnit, Routes, Unit};
use std::sync::Arc;

pub const COORDINATOR: &str = "coordinator";
pub const PLANNER: &str = "planner";
pub const SUPERVISOR: &str = "supervisor";
pub const GENERATOR: &str = "generator";

pub struct HierarchyBuilder {
    oracle: Arc<dyn DecisionOracle>,
    coordinator: Option<Arc<dyn DecisionOracle>>,
    planner: Option<Arc<dyn DecisionOracle>>,
    generator: Option<Arc<dyn DecisionOracle>>,
    use_planner: bool,
    teams: Vec<Arc<dyn Unit>>,
}

impl HierarchyBuilder {
    pub fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            oracle,
            coordinator: None,
            planner: None,
            generator: None,
            use_planner: true,
            teams: Vec::new(),
        }
    }

    pub fn with_coordinator(mut self, oracle: Arc<dyn DecisionOracle>) -> Self {
        self.coordinator = Some(oracle);
        self
    }

    pub fn with_planner(mut self, oracle: Arc<dyn DecisionOracle>) -> Self {
        self.planner = Some(oracle);
        self.use_planner = true;
        self
    }

    pub fn with_generator(mut self, oracle: Arc<dyn DecisionOracle>) -> Self {
        self.generator = Some(oracle);
        self
    }

    /// Coordinator hands off straight to the supervisor
    pub fn without_planner(mut self) -> Self {
        self.use_planner = false;
        self.planner = None;
        self
    }

    /// Add a team; it must route back to [`SUPERVISOR`]
    pub fn add_team<U: Unit + 'static>(self, team: U) -> Self {
        self.add_shared_team(Arc::new(team))
    }

    pub fn add_shared_team(mut self, team: Arc<dyn Unit>) -> Self {
        self.teams.push(team);
        self
    }

    pub fn build(self) -> Result<RoutingGraph> {
        if self.teams.is_empty() {
            return Err(RouteError::validation("a hierarchy needs at least one team"));
        }
        let members: Vec<String> = self.teams.iter().map(|t| t.name().to_string()).collect();
        for team in &self.teams {
            if !team.routes().permits(SUPERVISOR) {
                return Err(RouteError::validation(format!(
                    "team '{}' cannot route back to '{}'",
                    team.name(),
                    SUPERVISOR
                )));
            }
        }

        let role = |specific: Option<Arc<dyn DecisionOracle>>| specific.unwrap_or_else(|| Arc::clone(&self.oracle));
        let after_coordinator = if self.use_planner { PLANNER } else { SUPERVISOR };

        let mut builder = RoutingGraph::builder();
        builder
            .add_unit(
                OracleUnit::new(COORDINATOR, role(self.coordinator.clone()))
                    .with_routes(Routes::Static(vec![after_coordinator.to_string()])),
            )
            .add_unit(
                SupervisorUnit::new(SUPERVISOR, Arc::clone(&self.oracle), members).with_finish_route(GENERATOR),
            )
            .add_unit(OracleUnit::new(GENERATOR, role(self.generator.clone())).with_routes(Routes::Static(vec![])))
            .set_entry(COORDINATOR)
            .set_supervisor(SUPERVISOR);

        if self.use_planner {
            builder.add_unit(
                OracleUnit::new(PLANNER, role(self.planner.clone()))
                    .with_routes(Routes::Static(vec![SUPERVISOR.to_string()])),
            );
        }
        for team in self.teams {
            builder.add_shared(team);
        }

        builder.compile()
    }
}

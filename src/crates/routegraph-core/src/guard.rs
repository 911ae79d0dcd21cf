//! Loop protection
//!
//! Two layers keep a traversal finite:
//!
//! 1. **Build time**: [`CycleGuard::validate_structure`] walks the static
//!    routes and rejects any cycle that does not pass through a supervising
//!    unit. Supervisors are the only place a traversal may legitimately
//!    revisit units.
//! 2. **Run time**: a [`GuardSession`] counts steps against
//!    `max_iterations` and, when detection is on, aborts as soon as the same
//!    unit is reached with an unchanged context fingerprint more than
//!    `cycle_repeat_limit` times.
//!
//! The fingerprint covers the namespaced context, the plan and the progress
//! marker. Message history is left out, since routers append to it on every
//! visit without changing anything that matters.

use crate::config::EngineConfig;
use crate::error::{Result, RouteError};
use crate::graph::RoutingGraph;
use crate::state::ExecutionState;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

/// Units shown in a [`RouteError::CycleDetected`] pattern
const PATTERN_TAIL: usize = 8;

#[derive(Debug, Clone)]
pub struct CycleGuard {
    max_iterations: usize,
    detection_enabled: bool,
    repeat_limit: usize,
}

impl CycleGuard {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            detection_enabled: config.cycle_detection_enabled,
            repeat_limit: config.cycle_repeat_limit,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Reject graphs whose static routes loop without a supervisor
    pub fn validate_structure(graph: &RoutingGraph) -> Result<()> {
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for name in graph.unit_names() {
            if graph.is_supervising(name) {
                adjacency.insert(name, Vec::new());
                continue;
            }
            let targets = graph
                .static_routes(name)
                .into_iter()
                .filter(|t| graph.contains(t))
                .collect();
            adjacency.insert(name, targets);
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        for &start in adjacency.keys() {
            if marks.contains_key(start) {
                continue;
            }
            if let Some(path) = visit(start, &adjacency, &mut marks, &mut stack) {
                return Err(RouteError::StructuralCycle { path });
            }
        }
        Ok(())
    }

    /// Fresh run-time state for one traversal
    pub fn session(&self) -> GuardSession {
        GuardSession {
            guard: self.clone(),
            seen: HashMap::new(),
            path: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn visit<'a>(
    node: &'a str,
    adjacency: &BTreeMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(node, Mark::Visiting);
    stack.push(node);

    for &next in adjacency.get(node).into_iter().flatten() {
        match marks.get(next) {
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == next).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = visit(next, adjacency, marks, stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
}

/// Per-traversal guard state
#[derive(Debug)]
pub struct GuardSession {
    guard: CycleGuard,
    seen: HashMap<(String, u64), usize>,
    path: Vec<String>,
}

impl GuardSession {
    /// Admit one more invocation of `unit`, or refuse it
    ///
    /// Called before every step; on success `unit` is appended to the path.
    pub fn check(&mut self, unit: &str, state: &ExecutionState) -> Result<()> {
        if self.path.len() >= self.guard.max_iterations {
            return Err(RouteError::MaxIterationsExceeded {
                limit: self.guard.max_iterations,
            });
        }

        if self.guard.detection_enabled {
            let count = self.seen.entry((unit.to_string(), fingerprint(state))).or_insert(0);
            *count += 1;
            if *count > self.guard.repeat_limit {
                let tail = self.path.len().saturating_sub(PATTERN_TAIL);
                let mut pattern = self.path[tail..].to_vec();
                pattern.push(unit.to_string());
                return Err(RouteError::CycleDetected {
                    unit: unit.to_string(),
                    repeats: *count,
                    pattern,
                });
            }
        }

        self.path.push(unit.to_string());
        Ok(())
    }

    /// Units admitted so far, in order
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn into_path(self) -> Vec<String> {
        self.path
    }
}

fn fingerprint(state: &ExecutionState) -> u64 {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(state.all_context())
        .unwrap_or_default()
        .hash(&mut hasher);
    state.plan().map(|p| p.to_string()).hash(&mut hasher);
    state.progress().hash(&mut hasher);
    hasher.finish()
}

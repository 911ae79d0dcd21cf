//! End-to-end traversal behaviour

use async_trait::async_trait;
use proptest::prelude::*;
use routegraph_core::{
    Blocking, BlockingOracle, CancellationToken, Directive, EngineConfig, ExecutionState, FnOracle, FnUnit,
    GraphExecutor, HierarchyBuilder, Message, OracleUnit, OwnedDecisionRequest, RouteError, RoutingGraph,
    TerminationReason, Team, Unit,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn executor(config: EngineConfig) -> GraphExecutor {
    GraphExecutor::new(config).unwrap()
}

/// A graph with one oracle-driven unit "A" that always routes back to itself
fn self_routing_graph() -> RoutingGraph {
    let oracle = Arc::new(FnOracle::new(|_| Ok(json!({"terminal": false, "next": "A"}))));
    let mut builder = RoutingGraph::builder();
    builder.add_unit(OracleUnit::new("A", oracle)).set_entry("A");
    builder.compile().unwrap()
}

/// Sleeps far longer than any test timeout
struct Sleeper;

#[async_trait]
impl Unit for Sleeper {
    fn name(&self) -> &str {
        "sleeper"
    }

    async fn process(&self, _state: &mut ExecutionState) -> routegraph_core::Result<Directive> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Directive::terminal("woke up"))
    }
}

fn sleeper_graph() -> RoutingGraph {
    let mut builder = RoutingGraph::builder();
    builder.add_unit(Sleeper).set_entry("sleeper");
    builder.compile().unwrap()
}

#[tokio::test]
async fn linear_path_completes() {
    tooling::logging::init_test_tracing();

    let mut builder = RoutingGraph::builder();
    builder
        .add_unit(FnUnit::new("A", |state| {
            state.push_message(Message::from_unit("A", "step one"));
            Ok(Directive::route("B"))
        }))
        .add_unit(FnUnit::new("B", |state| {
            state.push_message(Message::from_unit("B", "step two"));
            Ok(Directive::terminal("done"))
        }))
        .add_edge("A", "B")
        .set_entry("A");
    let graph = builder.compile().unwrap();

    let traversal = executor(EngineConfig::default())
        .run(&graph, ExecutionState::new())
        .await
        .unwrap();

    assert_eq!(traversal.reason, TerminationReason::Completed);
    assert_eq!(traversal.steps, 2);
    assert_eq!(traversal.path, vec!["A", "B"]);
    let contents: Vec<_> = traversal.state.history().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["step one", "step two"]);
    assert_eq!(traversal.answer(), Some("done"));
}

#[tokio::test]
async fn forced_abort_after_exactly_max_iterations() {
    let graph = self_routing_graph();
    let err = executor(EngineConfig::default().with_max_iterations(3))
        .run(&graph, ExecutionState::with_query("loop forever"))
        .await
        .unwrap_err();

    assert!(matches!(err.error, RouteError::MaxIterationsExceeded { limit: 3 }));
    assert_eq!(err.reason(), TerminationReason::MaxIterationsExceeded);
    assert_eq!(err.steps, 3);
    assert_eq!(err.path, vec!["A", "A", "A"]);
    assert_eq!(err.state.history().len(), 1);
}

#[tokio::test]
async fn loop_without_progress_is_detected_early() {
    let oracle = Arc::new(FnOracle::new(|_| Ok(json!({"next": "worker"}))));
    let supervisor = routegraph_core::SupervisorUnit::new("supervisor", oracle, ["worker"]);
    let idle_worker = FnUnit::new("worker", |_| Ok(Directive::route("supervisor")));

    let mut builder = RoutingGraph::builder();
    builder
        .add_unit(supervisor)
        .add_unit(idle_worker)
        .add_edge("worker", "supervisor")
        .set_entry("supervisor")
        .set_supervisor("supervisor");
    let graph = builder.compile().unwrap();

    let config = EngineConfig::default()
        .with_max_iterations(50)
        .with_cycle_repeat_limit(2);
    let err = executor(config)
        .run(&graph, ExecutionState::with_query("q"))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), TerminationReason::CycleDetected);
    match &err.error {
        RouteError::CycleDetected { unit, repeats, pattern } => {
            assert_eq!(unit, "supervisor");
            assert_eq!(*repeats, 3);
            assert_eq!(pattern.last().map(String::as_str), Some("supervisor"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(err.steps, 4);
}

#[tokio::test]
async fn unregistered_target_is_invalid_directive() {
    let oracle = Arc::new(FnOracle::new(|_| Ok(json!({"next": "ghost"}))));
    let mut builder = RoutingGraph::builder();
    builder.add_unit(OracleUnit::new("router", oracle)).set_entry("router");
    let graph = builder.compile().unwrap();

    let err = executor(EngineConfig::default())
        .run(&graph, ExecutionState::new())
        .await
        .unwrap_err();

    assert!(matches!(err.error, RouteError::InvalidRoutingDirective { ref unit, .. } if unit == "router"));
    assert!(err.error.is_unit_failure());
    assert_eq!(err.reason(), TerminationReason::UnitFailed);
    assert_eq!(err.steps, 1);
}

#[tokio::test]
async fn unrecognized_oracle_output_is_rejected() {
    let oracle = Arc::new(FnOracle::new(|_| Ok(json!({"goto": "B", "why": "because"}))));
    let mut builder = RoutingGraph::builder();
    builder
        .add_unit(OracleUnit::new("A", oracle))
        .add_unit(FnUnit::new("B", |_| Ok(Directive::terminal("unreachable"))))
        .set_entry("A");
    let graph = builder.compile().unwrap();

    let err = executor(EngineConfig::default())
        .run(&graph, ExecutionState::new())
        .await
        .unwrap_err();
    assert!(matches!(err.error, RouteError::InvalidRoutingDirective { .. }));
    assert!(err.state.answer().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_unit_times_out() {
    let graph = sleeper_graph();
    let config = EngineConfig::default().with_unit_timeout(Duration::from_millis(50));

    let err = executor(config).run(&graph, ExecutionState::new()).await.unwrap_err();
    match err.error {
        RouteError::Timeout { ref unit, timeout } => {
            assert_eq!(unit, "sleeper");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        ref other => panic!("unexpected {:?}", other),
    }
    assert_eq!(err.reason(), TerminationReason::UnitFailed);
}

#[tokio::test]
async fn cancelled_before_start() {
    let graph = sleeper_graph();
    let token = CancellationToken::new();
    token.cancel();

    let err = executor(EngineConfig::default())
        .run_with_cancellation(&graph, ExecutionState::new(), token)
        .await
        .unwrap_err();
    assert!(matches!(err.error, RouteError::Cancelled));
    assert_eq!(err.steps, 0);
    assert!(err.path.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_while_unit_runs() {
    let graph = sleeper_graph();
    let exec = executor(EngineConfig::default());
    let token = CancellationToken::new();
    let trigger = token.clone();

    let (result, ()) = tokio::join!(
        exec.run_with_cancellation(&graph, ExecutionState::new(), token),
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        }
    );

    let err = result.unwrap_err();
    assert_eq!(err.reason(), TerminationReason::Cancelled);
    assert_eq!(err.path, vec!["sleeper"]);
}

struct KeywordRouter;

impl BlockingOracle for KeywordRouter {
    fn decide_blocking(&self, request: OwnedDecisionRequest) -> routegraph_core::Result<Value> {
        Ok(match request.unit.as_str() {
            "router" => json!({"next": "answer", "state_delta": {"context": {"routed": true}}}),
            _ => json!({"terminal": true, "answer": "42"}),
        })
    }
}

#[test]
fn blocking_oracle_and_blocking_run() {
    let oracle = Arc::new(Blocking::new(KeywordRouter));
    let mut builder = RoutingGraph::builder();
    builder
        .add_unit(OracleUnit::new("router", oracle.clone()))
        .add_unit(OracleUnit::new("answer", oracle))
        .set_entry("router");
    let graph = builder.compile().unwrap();

    let traversal = executor(EngineConfig::default())
        .run_blocking(&graph, ExecutionState::with_query("what is six times seven"))
        .unwrap();

    assert_eq!(traversal.answer(), Some("42"));
    assert_eq!(traversal.state.context("router", "routed"), Some(&json!(true)));
}

#[test]
fn structural_cycle_rejected_before_running() {
    let mut builder = RoutingGraph::builder();
    builder
        .add_unit(FnUnit::new("fetch", |_| Ok(Directive::route("parse"))))
        .add_unit(FnUnit::new("parse", |_| Ok(Directive::route("fetch"))))
        .add_edge("fetch", "parse")
        .add_edge("parse", "fetch")
        .set_entry("fetch");

    match builder.compile() {
        Err(RouteError::StructuralCycle { path }) => assert_eq!(path, vec!["fetch", "parse", "fetch"]),
        Err(other) => panic!("unexpected {:?}", other),
        Ok(_) => panic!("cycle accepted"),
    }
}

fn research_team() -> Team {
    let mut inner = RoutingGraph::builder();
    inner
        .add_unit(FnUnit::new("lookup", |state| {
            state.push_message(Message::tool("search", "Paris"));
            Ok(Directive::route("summarize"))
        }))
        .add_unit(FnUnit::new("summarize", |_| Ok(Directive::terminal("The capital is Paris."))))
        .add_edge("lookup", "summarize")
        .set_entry("lookup");

    Team::new(
        "research",
        inner.compile().unwrap(),
        executor(EngineConfig::default().with_max_iterations(5)),
    )
}

#[tokio::test]
async fn full_hierarchy_runs_to_the_generator() {
    let supervisor_visits = Arc::new(AtomicUsize::new(0));
    let visits = supervisor_visits.clone();

    let oracle = Arc::new(FnOracle::new(move |request| {
        Ok(match request.unit {
            "coordinator" => json!({"next": "planner"}),
            "planner" => json!({"next": "supervisor", "state_delta": {"plan": ["research"]}}),
            "supervisor" => {
                visits.fetch_add(1, Ordering::SeqCst);
                if request.state.context("research", "answer").is_some() {
                    json!({"terminal": true, "answer": "Paris, per research"})
                } else {
                    json!({"next": "research"})
                }
            }
            "generator" => json!({"terminal": true, "answer": "The capital of France is Paris."}),
            other => json!({"unexpected": other}),
        })
    }));

    let graph = HierarchyBuilder::new(oracle).add_team(research_team()).build().unwrap();
    let traversal = executor(EngineConfig::default())
        .run(&graph, ExecutionState::with_query("What is the capital of France?"))
        .await
        .unwrap();

    assert_eq!(
        traversal.path,
        vec!["coordinator", "planner", "supervisor", "research", "supervisor", "generator"]
    );
    assert_eq!(traversal.answer(), Some("The capital of France is Paris."));
    assert_eq!(traversal.state.plan(), Some(&json!(["research"])));
    assert_eq!(
        traversal.state.context("supervisor", "draft_answer"),
        Some(&json!("Paris, per research"))
    );
    assert_eq!(supervisor_visits.load(Ordering::SeqCst), 2);
    assert!(traversal
        .state
        .history()
        .iter()
        .any(|m| m.content == "The capital is Paris."));
}

#[tokio::test]
async fn failing_team_surfaces_as_unit_error() {
    let mut inner = RoutingGraph::builder();
    inner
        .add_unit(FnUnit::new("flaky", |state| {
            state.push_message(Message::from_unit("flaky", "trying upstream"));
            Err(RouteError::unit_execution("flaky", "upstream 503"))
        }))
        .set_entry("flaky");
    let team = Team::new("broken", inner.compile().unwrap(), executor(EngineConfig::default()));

    let oracle = Arc::new(FnOracle::new(|request| {
        Ok(match request.unit {
            "coordinator" => json!({"next": "supervisor"}),
            _ => json!({"next": "broken"}),
        })
    }));
    let graph = HierarchyBuilder::new(oracle)
        .without_planner()
        .add_team(team)
        .build()
        .unwrap();

    let err = executor(EngineConfig::default())
        .run(&graph, ExecutionState::with_query("fetch the data"))
        .await
        .unwrap_err();

    assert!(matches!(err.error, RouteError::UnitExecution { ref unit, .. } if unit == "broken"));
    assert_eq!(err.path, vec!["coordinator", "supervisor", "broken"]);
    assert_eq!(err.state.last_message().unwrap().content, "trying upstream");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn self_routing_always_stops_at_the_bound(max in 1usize..40) {
        let graph = self_routing_graph();
        let config = EngineConfig::default()
            .with_max_iterations(max)
            .with_cycle_detection(false);

        let err = executor(config)
            .run_blocking(&graph, ExecutionState::with_query("again"))
            .unwrap_err();

        prop_assert!(matches!(err.error, RouteError::MaxIterationsExceeded { limit } if limit == max), "expected MaxIterationsExceeded with limit {}", max);
        prop_assert_eq!(err.steps, max);
    }

    #[test]
    fn random_routing_terminates_within_the_bound(choices in prop::collection::vec(0usize..3, 1..20), max in 1usize..30) {
        let script = Arc::new(choices);
        let cursor = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(FnOracle::new(move |_| {
            let i = cursor.fetch_add(1, Ordering::SeqCst);
            let target = ["a", "b", "c"][script[i % script.len()]];
            Ok(json!({"next": target}))
        }));

        let mut builder = RoutingGraph::builder();
        for name in ["a", "b", "c"] {
            builder.add_unit(OracleUnit::new(name, oracle.clone()));
        }
        builder.set_entry("a");
        let graph = builder.compile().unwrap();

        let err = executor(EngineConfig::default().with_max_iterations(max))
            .run_blocking(&graph, ExecutionState::new())
            .unwrap_err();

        prop_assert!(err.error.is_bound_exceeded());
        prop_assert!(err.steps <= max);
    }
}

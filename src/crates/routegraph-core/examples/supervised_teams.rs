//! Supervised teams example
//!
//! Builds the full hierarchy with a rule-based oracle, a nested research
//! team and a learning tool team, then runs a handful of queries and prints
//! what the tool team learned.

use routegraph_core::config::ENV_PREFIX;
use routegraph_core::hierarchy::{COORDINATOR, GENERATOR, PLANNER, SUPERVISOR};
use routegraph_core::{
    ActionRegistry, Directive, ExecutionState, FnOracle, FnUnit, GraphExecutor, HierarchyBuilder, LearningTeam,
    Message, RouteError, RouteGraphConfig, RoutingGraph, Team,
};
use routegraph_rl::{ActionOutcome, LearningContext};
use serde_json::json;
use std::sync::Arc;
use tooling::config::ConfigBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tooling::logging::init_tracing("warn");

    println!("=== Supervised Teams Example ===\n");

    let config = RouteGraphConfig::from_env_with_defaults(ENV_PREFIX, RouteGraphConfig::default())?;
    let executor = GraphExecutor::new(config.engine.clone())?;

    // A two-step research team: gather, then summarize
    let mut research = RoutingGraph::builder();
    research
        .add_unit(FnUnit::new("gather", |state| {
            let topic = state.last_user_message().map(|m| m.content.clone()).unwrap_or_default();
            state.push_message(Message::from_unit("gather", format!("three sources about '{}'", topic)));
            Ok(Directive::route("summarize"))
        }))
        .add_unit(FnUnit::new("summarize", |_| Ok(Directive::terminal("sources agree on the main points"))))
        .set_entry("gather");
    let research_team = Team::new("research", research.compile()?, executor.clone());

    // A tool team that learns which action suits which query
    let mut registry = ActionRegistry::new();
    registry
        .register("search", |args| async move {
            ActionOutcome::Success(json!(format!("top hits for {}", args["query"].as_str().unwrap_or(""))))
        })
        .register("calculator", |args| async move {
            let query = args["query"].as_str().unwrap_or("").to_string();
            if query.chars().any(|c| c.is_ascii_digit()) {
                ActionOutcome::Success(json!("42"))
            } else {
                ActionOutcome::Failure("nothing to calculate".into())
            }
        })
        .register("weather", |_| async { ActionOutcome::Success(json!("")) });
    let learning = LearningContext::builder(config.learning.clone()).with_seed(7).build()?;
    let tools = LearningTeam::new("tools", learning.clone(), registry.catalog()?, Arc::new(registry)).with_top_n(1)?;

    // One rule-based oracle plays every role
    let oracle = Arc::new(FnOracle::new(|request| {
        let query = request
            .state
            .last_user_message()
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();
        let reply = match request.unit {
            COORDINATOR => json!({"next": PLANNER}),
            PLANNER => json!({"next": SUPERVISOR, "state_delta": {"plan": format!("answer: {}", query)}}),
            SUPERVISOR if request.state.progress() > 0 => json!({"next": "FINISH"}),
            SUPERVISOR if query.contains("research") => json!({"next": "research"}),
            SUPERVISOR => json!({"next": "tools"}),
            GENERATOR => json!({"terminal": true, "answer": format!("final answer for '{}'", query)}),
            other => return Err(RouteError::validation(format!("no rule for unit '{}'", other))),
        };
        Ok(reply)
    }));

    let graph = HierarchyBuilder::new(oracle)
        .add_team(research_team)
        .add_team(tools)
        .build()?;

    let queries = [
        "research the history of the printing press",
        "what is 6 times 7",
        "what is 6 times 7",
        "weather tomorrow",
        "what is 12 plus 30",
    ];
    for query in queries {
        println!("Query:  {}", query);
        match executor.run(&graph, ExecutionState::with_query(query)).await {
            Ok(traversal) => {
                println!("Path:   {}", traversal.path.join(" -> "));
                println!("Answer: {}\n", traversal.answer().unwrap_or("<none>"));
            }
            Err(err) => {
                println!("Path:   {}", err.path.join(" -> "));
                println!("Failed: {}\n", err);
            }
        }
    }

    println!("=== Learned Q-values ===\n");
    let stats = learning.stats();
    println!(
        "{} states, {} actions, {} non-zero values\n",
        stats.total_states, stats.total_actions, stats.non_zero_q_values
    );
    println!("{}", learning.readable());

    Ok(())
}

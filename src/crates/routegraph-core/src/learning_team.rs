//! A team that learns which actions to run
//!
//! Each time the [`LearningTeam`] is visited it:
//!
//! 1. takes the latest user message as the query
//! 2. asks the [`ActionSelector`](routegraph_rl::ActionSelector) for a subset
//!    of its catalog (ε-greedy over the Q-values of the query's signature)
//! 3. invokes each chosen action through its [`ActionInvoker`], retrying a
//!    failed call up to `max_action_attempts` times
//! 4. scores every outcome with its [`RewardEngine`]
//! 5. updates the shared Q-value store against exactly the signature the
//!    selector returned
//!
//! In [`EpisodeMode::Chained`] step 5 is deferred: the update waits in the
//! state until the team is visited again within the same traversal, and is
//! then bootstrapped from the new signature's best value. Whatever is still
//! pending when the traversal stops is flushed without a future term.

use crate::directive::Directive;
use crate::error::{Result, RouteError};
use crate::state::{ExecutionState, Message};
use crate::team::DEFAULT_RETURN_TO;
use crate::unit::{Routes, Unit};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use routegraph_rl::{ActionCatalog, ActionOutcome, LearningContext, RewardEngine, StateSignature};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

const PENDING_KEY: &str = "pending_update";

/// Executes actions on behalf of a team
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(&self, action: &str, arguments: Value) -> ActionOutcome;
}

type ActionHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ActionOutcome> + Send + Sync>;

/// Async action handlers by name, in registration order
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, ActionHandler>,
    order: Vec<String>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionOutcome> + Send + 'static,
    {
        let name = name.into();
        if !self.handlers.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.handlers.insert(name, Arc::new(move |args| handler(args).boxed()));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Catalog listing every registered action
    pub fn catalog(&self) -> routegraph_rl::Result<ActionCatalog> {
        ActionCatalog::from_names(self.order.iter().cloned())
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry").field("actions", &self.order).finish()
    }
}

#[async_trait]
impl ActionInvoker for ActionRegistry {
    async fn invoke(&self, action: &str, arguments: Value) -> ActionOutcome {
        match self.handlers.get(action) {
            Some(handler) => handler(arguments).await,
            None => ActionOutcome::Failure(format!("unknown action '{}'", action)),
        }
    }
}

/// How updates relate across visits within one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeMode {
    /// Every visit is its own episode; updates apply immediately
    #[default]
    SingleStep,
    /// Visits form one episode; each update bootstraps from the next visit
    Chained,
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingUpdate {
    signature: StateSignature,
    rewards: Vec<(String, f64)>,
}

/// What a visit did, as recorded in context
#[derive(Debug, Serialize)]
struct ActionReport<'a> {
    action: &'a str,
    attempts: usize,
    outcome: &'a ActionOutcome,
    reward: f64,
}

pub struct LearningTeam {
    name: String,
    learning: LearningContext,
    catalog: ActionCatalog,
    invoker: Arc<dyn ActionInvoker>,
    rewards: RewardEngine,
    top_n: usize,
    max_action_attempts: usize,
    episode_mode: EpisodeMode,
    return_to: String,
}

impl LearningTeam {
    /// Team using the learning context's `top_n` and rule-based rewards
    pub fn new(
        name: impl Into<String>,
        learning: LearningContext,
        catalog: ActionCatalog,
        invoker: Arc<dyn ActionInvoker>,
    ) -> Self {
        let top_n = learning.config().top_n;
        Self {
            name: name.into(),
            learning,
            catalog,
            invoker,
            rewards: RewardEngine::rule_based(),
            top_n,
            max_action_attempts: 1,
            episode_mode: EpisodeMode::default(),
            return_to: DEFAULT_RETURN_TO.to_string(),
        }
    }

    pub fn with_rewards(mut self, rewards: RewardEngine) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(RouteError::validation("top_n must be at least 1"));
        }
        self.top_n = top_n;
        Ok(self)
    }

    pub fn with_max_action_attempts(mut self, attempts: usize) -> Result<Self> {
        if attempts == 0 {
            return Err(RouteError::validation("max_action_attempts must be at least 1"));
        }
        self.max_action_attempts = attempts;
        Ok(self)
    }

    pub fn with_episode_mode(mut self, mode: EpisodeMode) -> Self {
        self.episode_mode = mode;
        self
    }

    pub fn with_return_to(mut self, unit: impl Into<String>) -> Self {
        self.return_to = unit.into();
        self
    }

    pub fn learning(&self) -> &LearningContext {
        &self.learning
    }

    async fn invoke_with_retry(&self, action: &str, arguments: &Value) -> (ActionOutcome, usize) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self.invoker.invoke(action, arguments.clone()).await;
            if !outcome.is_failure() || attempts >= self.max_action_attempts {
                return (outcome, attempts);
            }
            debug!(team = %self.name, action, attempts, "action failed, retrying");
        }
    }

    /// Apply a deferred update, bootstrapping from `next` when given
    fn flush_pending(&self, state: &mut ExecutionState, next: Option<&StateSignature>) -> Result<()> {
        let Some(raw) = state.remove_context(&self.name, PENDING_KEY) else {
            return Ok(());
        };
        let pending: PendingUpdate = serde_json::from_value(raw)
            .map_err(|e| RouteError::unit_execution(&self.name, format!("corrupt pending update: {}", e)))?;

        let store = self.learning.store();
        for (action, reward) in &pending.rewards {
            store.update(&pending.signature, action, *reward, next)?;
        }
        debug!(
            team = %self.name,
            signature = %pending.signature,
            chained = next.is_some(),
            "applied deferred update"
        );
        Ok(())
    }
}

impl fmt::Debug for LearningTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningTeam")
            .field("name", &self.name)
            .field("catalog", &self.catalog)
            .field("top_n", &self.top_n)
            .field("max_action_attempts", &self.max_action_attempts)
            .field("episode_mode", &self.episode_mode)
            .field("return_to", &self.return_to)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Unit for LearningTeam {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, state: &mut ExecutionState) -> Result<Directive> {
        let query = state
            .last_user_message()
            .map(|m| m.content.clone())
            .ok_or_else(|| RouteError::unit_execution(&self.name, "no user query in history"))?;

        let selection = self
            .learning
            .selector()
            .select(&query, &self.catalog, self.top_n)
            .await
            .map_err(|e| RouteError::unit_execution(&self.name, e))?;

        if self.episode_mode == EpisodeMode::Chained {
            self.flush_pending(state, Some(&selection.signature))?;
        }

        let arguments = json!({ "query": query });
        let mut outcomes = Vec::with_capacity(selection.actions.len());
        for action in &selection.actions {
            let (outcome, attempts) = self.invoke_with_retry(action, &arguments).await;
            let record = self
                .rewards
                .score(&query, &selection.signature, action, &outcome)
                .await;
            outcomes.push((action.as_str(), attempts, outcome, record.reward));
        }

        let rewards: Vec<(String, f64)> = outcomes.iter().map(|(a, _, _, r)| (a.to_string(), *r)).collect();
        match self.episode_mode {
            EpisodeMode::SingleStep => {
                let store = self.learning.store();
                for (action, reward) in &rewards {
                    store.update(&selection.signature, action, *reward, None)?;
                }
            }
            EpisodeMode::Chained => {
                let pending = PendingUpdate {
                    signature: selection.signature.clone(),
                    rewards,
                };
                let value = serde_json::to_value(&pending)
                    .map_err(|e| RouteError::unit_execution(&self.name, e))?;
                state.set_context(&self.name, PENDING_KEY, value);
            }
        }

        for (action, _, outcome, _) in &outcomes {
            state.push_message(Message::tool(*action, outcome.render()));
        }
        let reports: Vec<ActionReport<'_>> = outcomes
            .iter()
            .map(|(action, attempts, outcome, reward)| ActionReport {
                action: *action,
                attempts: *attempts,
                outcome,
                reward: *reward,
            })
            .collect();
        state.set_context(&self.name, "signature", json!(selection.signature));
        state.set_context(&self.name, "explored", json!(selection.explored));
        state.set_context(&self.name, "actions", json!(selection.actions));
        state.set_context(&self.name, "results", json!(reports));
        state.mark_progress();

        debug!(
            team = %self.name,
            signature = %selection.signature,
            actions = ?selection.actions,
            explored = selection.explored,
            "actions executed"
        );

        if outcomes.iter().all(|(_, _, outcome, _)| outcome.is_failure()) {
            warn!(team = %self.name, actions = ?selection.actions, "every chosen action failed");
            let errors: Vec<String> = outcomes.iter().map(|(_, _, o, _)| o.render()).collect();
            return Err(RouteError::unit_execution(&self.name, errors.join("; ")));
        }

        Ok(Directive::route(self.return_to.clone()))
    }

    fn routes(&self) -> Routes {
        Routes::Static(vec![self.return_to.clone()])
    }

    async fn on_traversal_end(&self, state: &mut ExecutionState) -> Result<()> {
        self.flush_pending(state, None)
    }
}

//! Reward strategies and the reward engine
//!
//! A [`RewardStrategy`] turns an action's outcome into a scalar. Strategies
//! may fail; the [`RewardEngine`] never does. It degrades any failure to the
//! neutral reward and reports it through `tracing` and an optional
//! [`RewardObserver`].

use crate::catalog::ActionOutcome;
use crate::error::{LearningError, Result};
use crate::signature::StateSignature;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Reward used when a result cannot be scored
pub const NEUTRAL_REWARD: f64 = 0.0;

/// Scores the outcome of one executed action
#[async_trait]
pub trait RewardStrategy: Send + Sync {
    async fn score(&self, query: &str, action: &str, outcome: &ActionOutcome) -> Result<f64>;

    /// Short label for logs
    fn name(&self) -> &str;
}

/// Inspects results for explicit success and failure markers
///
/// | outcome | reward |
/// |---|---|
/// | action failed, error payload, `"Error..."` text | `failure_reward` |
/// | empty string, array or object | `empty_penalty` |
/// | `null` | unscoreable |
/// | anything else | `success_reward` |
#[derive(Debug, Clone)]
pub struct RuleBasedReward {
    pub success_reward: f64,
    pub failure_reward: f64,
    pub empty_penalty: f64,
}

impl Default for RuleBasedReward {
    fn default() -> Self {
        Self {
            success_reward: 1.0,
            failure_reward: -0.5,
            empty_penalty: -0.3,
        }
    }
}

impl RuleBasedReward {
    pub fn new(success_reward: f64, failure_reward: f64, empty_penalty: f64) -> Self {
        Self {
            success_reward,
            failure_reward,
            empty_penalty,
        }
    }

    /// Deterministic classification of an outcome
    pub fn evaluate(&self, outcome: &ActionOutcome) -> Result<f64> {
        let value = match outcome {
            ActionOutcome::Failure(_) => return Ok(self.failure_reward),
            ActionOutcome::Success(value) => value,
        };

        match value {
            Value::Null => Err(LearningError::unscoreable("action returned null")),
            Value::String(s) if s.trim().is_empty() => Ok(self.empty_penalty),
            Value::String(s) if Self::text_reports_error(s) => Ok(self.failure_reward),
            Value::Array(items) if items.is_empty() => Ok(self.empty_penalty),
            Value::Object(map) if map.is_empty() => Ok(self.empty_penalty),
            Value::Object(map) if Self::object_reports_error(map) => Ok(self.failure_reward),
            Value::Bool(false) => Ok(self.failure_reward),
            _ => Ok(self.success_reward),
        }
    }

    fn text_reports_error(text: &str) -> bool {
        let lowered = text.trim_start().to_lowercase();
        lowered.starts_with("error") || lowered.contains("error:") || lowered.starts_with("failed")
    }

    fn object_reports_error(map: &serde_json::Map<String, Value>) -> bool {
        if map.get("error").is_some_and(|e| !e.is_null()) {
            return true;
        }
        if map.get("success") == Some(&Value::Bool(false)) {
            return true;
        }
        matches!(
            map.get("status").and_then(Value::as_str).map(str::to_lowercase).as_deref(),
            Some("error" | "failed" | "failure")
        )
    }
}

#[async_trait]
impl RewardStrategy for RuleBasedReward {
    async fn score(&self, _query: &str, _action: &str, outcome: &ActionOutcome) -> Result<f64> {
        self.evaluate(outcome)
    }

    fn name(&self) -> &str {
        "rule_based"
    }
}

/// A scalar supplied by the caller, consumed by the next score
#[derive(Debug, Default)]
pub struct UserFeedbackReward {
    pending: Mutex<Option<f64>>,
}

impl UserFeedbackReward {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide the reward for the next scored action
    pub fn submit(&self, reward: f64) -> Result<()> {
        if !reward.is_finite() {
            return Err(LearningError::InvalidReward {
                action: "<feedback>".to_string(),
                reward,
            });
        }
        *self.pending.lock() = Some(reward);
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

#[async_trait]
impl RewardStrategy for UserFeedbackReward {
    async fn score(&self, _query: &str, action: &str, _outcome: &ActionOutcome) -> Result<f64> {
        self.pending
            .lock()
            .take()
            .ok_or_else(|| LearningError::unscoreable(format!("no feedback submitted for '{}'", action)))
    }

    fn name(&self) -> &str {
        "user_feedback"
    }
}

/// Answers a rating prompt; usually backed by the decision oracle's model
#[async_trait]
pub trait Rater: Send + Sync {
    async fn rate(&self, prompt: &str) -> Result<String>;
}

/// Asks a [`Rater`] to grade the result from 0 to 10, mapped linearly onto `[-1, 1]`
pub struct OracleScoredReward {
    rater: Arc<dyn Rater>,
}

impl OracleScoredReward {
    pub const SCALE_MAX: f64 = 10.0;

    pub fn new(rater: Arc<dyn Rater>) -> Self {
        Self { rater }
    }

    fn prompt(query: &str, action: &str, outcome: &ActionOutcome) -> String {
        format!(
            "Rate how useful this tool result is for the request, from 0 (useless) to 10 (fully answers it).\n\
             Request: {}\nTool: {}\nResult: {}\nReply with a single number.",
            query,
            action,
            outcome.render()
        )
    }

    /// First number in `reply`, clamped to the scale and mapped to `[-1, 1]`
    pub fn parse_rating(reply: &str) -> Option<f64> {
        static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = NUMBER.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").ok()).as_ref()?;

        let rating: f64 = pattern.find(reply)?.as_str().parse().ok()?;
        let clamped = rating.clamp(0.0, Self::SCALE_MAX);
        Some(clamped / (Self::SCALE_MAX / 2.0) - 1.0)
    }
}

#[async_trait]
impl RewardStrategy for OracleScoredReward {
    async fn score(&self, query: &str, action: &str, outcome: &ActionOutcome) -> Result<f64> {
        let reply = self.rater.rate(&Self::prompt(query, action, outcome)).await?;
        Self::parse_rating(&reply)
            .ok_or_else(|| LearningError::unscoreable(format!("no rating found in reply '{}'", reply)))
    }

    fn name(&self) -> &str {
        "oracle_scored"
    }
}

/// Weighted average of several strategies
///
/// Children that fail (or return a non-finite value) are left out and the
/// average is taken over the remaining weights. A failing child therefore
/// does not count as a 0 reward and does not pull the score toward zero:
/// `1.0` at weight 1 next to a failing child at weight 5 scores `1.0`, not
/// `1/6`. The composite fails only when every child fails or the remaining
/// weights sum to 0.
pub struct CompositeReward {
    parts: Vec<(Arc<dyn RewardStrategy>, f64)>,
}

impl CompositeReward {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Add a strategy; weights must be finite and non-negative
    pub fn with(mut self, strategy: Arc<dyn RewardStrategy>, weight: f64) -> Result<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(LearningError::invalid_parameter(
                "weight",
                format!("{} must be finite and non-negative", weight),
            ));
        }
        self.parts.push((strategy, weight));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Default for CompositeReward {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RewardStrategy for CompositeReward {
    async fn score(&self, query: &str, action: &str, outcome: &ActionOutcome) -> Result<f64> {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for (strategy, weight) in &self.parts {
            match strategy.score(query, action, outcome).await {
                Ok(reward) if reward.is_finite() => {
                    weighted += weight * reward;
                    total_weight += weight;
                }
                Ok(reward) => debug!(strategy = strategy.name(), reward, "composite part returned non-finite reward"),
                Err(e) => debug!(strategy = strategy.name(), error = %e, "composite part skipped"),
            }
        }

        if total_weight == 0.0 {
            return Err(LearningError::unscoreable("no composite part produced a weighted score"));
        }
        Ok(weighted / total_weight)
    }

    fn name(&self) -> &str {
        "composite"
    }
}

/// One scored action execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub action: String,
    pub signature: StateSignature,
    pub reward: f64,
    pub timestamp: DateTime<Utc>,
    /// True when scoring failed and the neutral reward was substituted
    pub degraded: bool,
}

/// Receives every reward record, e.g. for external metrics
pub trait RewardObserver: Send + Sync {
    fn on_reward(&self, record: &RewardRecord);
}

/// Scores outcomes with a strategy, never failing
#[derive(Clone)]
pub struct RewardEngine {
    strategy: Arc<dyn RewardStrategy>,
    observer: Option<Arc<dyn RewardObserver>>,
}

impl RewardEngine {
    pub fn new(strategy: Arc<dyn RewardStrategy>) -> Self {
        Self {
            strategy,
            observer: None,
        }
    }

    /// Rule-based scoring with the default constants
    pub fn rule_based() -> Self {
        Self::new(Arc::new(RuleBasedReward::default()))
    }

    pub fn with_observer(mut self, observer: Arc<dyn RewardObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub async fn score(
        &self,
        query: &str,
        signature: &StateSignature,
        action: &str,
        outcome: &ActionOutcome,
    ) -> RewardRecord {
        let (reward, degraded) = match self.strategy.score(query, action, outcome).await {
            Ok(reward) if reward.is_finite() => (reward, false),
            Ok(reward) => {
                warn!(action, signature = %signature, reward, "non-finite reward replaced with neutral");
                (NEUTRAL_REWARD, true)
            }
            Err(e) => {
                warn!(action, signature = %signature, error = %e, "reward scoring failed, using neutral reward");
                (NEUTRAL_REWARD, true)
            }
        };

        let record = RewardRecord {
            action: action.to_string(),
            signature: signature.clone(),
            reward,
            timestamp: Utc::now(),
            degraded,
        };

        if let Some(observer) = &self.observer {
            observer.on_reward(&record);
        }
        record
    }
}

impl std::fmt::Debug for RewardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardEngine")
            .field("strategy", &self.strategy.name())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

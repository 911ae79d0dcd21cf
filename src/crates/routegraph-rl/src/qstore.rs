//! Q-value store
//!
//! Maps a state signature to per-action value estimates and applies the
//! update
//!
//! ```text
//! Q(s,a) ← Q(s,a) + α·(r + γ·max_a' Q(s',a') − Q(s,a))
//! ```
//!
//! Buckets live in a sharded [`DashMap`]; an update holds its bucket's entry
//! guard for the whole read-modify-write, so updates to one signature never
//! interleave while different signatures proceed independently.

use crate::config::{check_half_open, check_unit_interval, LearningConfig, UpdateMode};
use crate::error::{LearningError, Result};
use crate::signature::StateSignature;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Exported table: signature → action → value
pub type QTable = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug)]
pub struct QValueStore {
    table: DashMap<StateSignature, HashMap<String, f64>>,
    learning_rate: f64,
    discount_factor: f64,
    mode: UpdateMode,
}

impl QValueStore {
    pub fn new(learning_rate: f64, discount_factor: f64, mode: UpdateMode) -> Result<Self> {
        check_half_open("learning_rate", learning_rate)?;
        check_unit_interval("discount_factor", discount_factor)?;
        Ok(Self {
            table: DashMap::new(),
            learning_rate,
            discount_factor,
            mode,
        })
    }

    pub fn from_config(config: &LearningConfig) -> Result<Self> {
        Self::new(config.learning_rate, config.discount_factor, config.update_mode)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn discount_factor(&self) -> f64 {
        self.discount_factor
    }

    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    /// Create an empty bucket for a signature seen for the first time
    pub fn ensure(&self, signature: &StateSignature) {
        if !self.table.contains_key(signature) {
            self.table.entry(signature.clone()).or_default();
        }
    }

    pub fn contains(&self, signature: &StateSignature) -> bool {
        self.table.contains_key(signature)
    }

    /// Apply one update and return the new value
    ///
    /// `next` chains a follow-up signature whose best value supplies the
    /// future term. Without it the term is 0 in [`UpdateMode::SingleStep`]
    /// and the signature's own best value in [`UpdateMode::TemporalDifference`].
    /// A pair seen for the first time starts at 0.
    pub fn update(
        &self,
        signature: &StateSignature,
        action: &str,
        reward: f64,
        next: Option<&StateSignature>,
    ) -> Result<f64> {
        if !reward.is_finite() {
            return Err(LearningError::InvalidReward {
                action: action.to_string(),
                reward,
            });
        }

        // Read the follow-up bucket before taking this signature's entry lock;
        // both may hash to the same shard.
        let chained_future = match next {
            Some(next) if next != signature => Some(self.max_value(next)),
            _ => None,
        };

        let mut bucket = self.table.entry(signature.clone()).or_default();

        let future = match (chained_future, next) {
            (Some(value), _) => value,
            (None, Some(_)) => Self::bucket_max(&bucket),
            (None, None) => match self.mode {
                UpdateMode::SingleStep => 0.0,
                UpdateMode::TemporalDifference => Self::bucket_max(&bucket),
            },
        };

        let current = bucket.entry(action.to_string()).or_insert(0.0);
        let target = reward + self.discount_factor * future;
        *current += self.learning_rate * (target - *current);
        let updated = *current;
        drop(bucket);

        trace!(signature = %signature, action, reward, future, value = updated, "q-value updated");
        Ok(updated)
    }

    /// Apply the same reward to several actions, one independent update each
    pub fn update_batch<S: AsRef<str>>(
        &self,
        signature: &StateSignature,
        actions: &[S],
        reward: f64,
        next: Option<&StateSignature>,
    ) -> Result<Vec<f64>> {
        actions
            .iter()
            .map(|action| self.update(signature, action.as_ref(), reward, next))
            .collect()
    }

    /// Copy of a signature's action values; empty for unknown signatures
    pub fn read(&self, signature: &StateSignature) -> HashMap<String, f64> {
        self.table.get(signature).map(|b| b.clone()).unwrap_or_default()
    }

    /// Value of one pair, 0 when never updated
    pub fn value(&self, signature: &StateSignature, action: &str) -> f64 {
        self.table
            .get(signature)
            .and_then(|b| b.get(action).copied())
            .unwrap_or(0.0)
    }

    /// Best value recorded for a signature, 0 when it has none
    pub fn max_value(&self, signature: &StateSignature) -> f64 {
        self.table.get(signature).map(|b| Self::bucket_max(&b)).unwrap_or(0.0)
    }

    /// Number of signatures
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of stored pairs whose value is not exactly 0
    pub fn non_zero_values(&self) -> usize {
        self.table
            .iter()
            .map(|bucket| bucket.values().filter(|v| **v != 0.0).count())
            .sum()
    }

    pub fn clear(&self) {
        self.table.clear();
    }

    /// Full contents, ordered for stable output
    pub fn export(&self) -> QTable {
        self.table
            .iter()
            .map(|bucket| {
                let actions = bucket.value().iter().map(|(a, v)| (a.clone(), *v)).collect();
                (bucket.key().as_str().to_string(), actions)
            })
            .collect()
    }

    /// Replace all contents
    ///
    /// Every value must be finite. On error the store is left empty.
    pub fn import(&self, table: QTable) -> Result<()> {
        self.table.clear();

        for (signature, actions) in &table {
            for (action, value) in actions {
                if !value.is_finite() {
                    return Err(LearningError::snapshot(format!(
                        "non-finite value {} for ('{}', '{}')",
                        value, signature, action
                    )));
                }
            }
        }

        for (signature, actions) in table {
            self.table
                .insert(StateSignature::from_raw(signature), actions.into_iter().collect());
        }
        Ok(())
    }

    fn bucket_max(bucket: &HashMap<String, f64>) -> f64 {
        bucket.values().copied().reduce(f64::max).unwrap_or(0.0)
    }
}

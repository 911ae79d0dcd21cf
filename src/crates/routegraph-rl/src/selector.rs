//! Action selection: ε-greedy over Q-values, generalized through the semantic index

use crate::catalog::ActionCatalog;
use crate::config::{check_unit_interval, LearningConfig};
use crate::embedding::Embedder;
use crate::error::{LearningError, Result};
use crate::index::SemanticIndex;
use crate::qstore::QValueStore;
use crate::signature::StateSignature;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Outcome of [`ActionSelector::select`]
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Chosen action names, at most `top_n`
    pub actions: Vec<String>,
    /// Signature rewards must be reported against
    pub signature: StateSignature,
    /// True when the subset was drawn at random
    pub explored: bool,
    /// Similarity to a previously seen query whose bucket was reused
    pub matched_similarity: Option<f64>,
}

/// Chooses action subsets for queries
///
/// Selection is read-only with respect to the exploration rate; annealing
/// happens only through [`decay_exploration`](Self::decay_exploration) and
/// [`set_exploration_rate`](Self::set_exploration_rate).
#[derive(Debug)]
pub struct ActionSelector {
    store: Arc<QValueStore>,
    index: Arc<SemanticIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    exploration_rate: RwLock<f64>,
    min_exploration_rate: f64,
    rng: Mutex<StdRng>,
}

impl ActionSelector {
    pub fn new(store: Arc<QValueStore>, index: Arc<SemanticIndex>, config: &LearningConfig) -> Result<Self> {
        check_unit_interval("exploration_rate", config.exploration_rate)?;
        check_unit_interval("min_exploration_rate", config.min_exploration_rate)?;
        Ok(Self {
            store,
            index,
            embedder: None,
            exploration_rate: RwLock::new(config.exploration_rate),
            min_exploration_rate: config.min_exploration_rate,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Resolve paraphrases through `embedder` and the semantic index
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Vector size of the configured embedder, if embeddings are used
    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.embedder.as_ref().map(|e| e.dimensions())
    }

    /// Fix the random source, for reproducible exploration
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn exploration_rate(&self) -> f64 {
        *self.exploration_rate.read()
    }

    pub fn set_exploration_rate(&self, rate: f64) -> Result<()> {
        check_unit_interval("exploration_rate", rate)?;
        *self.exploration_rate.write() = rate;
        Ok(())
    }

    /// Multiply the exploration rate by `factor`, flooring at the configured minimum
    ///
    /// A rate already at or below the floor is left unchanged. Returns the new rate.
    pub fn decay_exploration(&self, factor: f64) -> Result<f64> {
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(LearningError::invalid_parameter(
                "decay_factor",
                format!("{} is outside (0, 1]", factor),
            ));
        }

        let mut rate = self.exploration_rate.write();
        if *rate > self.min_exploration_rate {
            *rate = (*rate * factor).max(self.min_exploration_rate);
        }
        Ok(*rate)
    }

    /// Resolve the signature a query's rewards belong to
    ///
    /// Registers a new bucket (and index entry) for queries not seen before.
    pub async fn resolve_signature(&self, query: &str) -> Result<(StateSignature, Option<f64>)> {
        let signature = StateSignature::from_query(query);

        let (signature, similarity) = match &self.embedder {
            Some(embedder) => {
                let embedding = embedder.embed(query).await?;
                let resolution = self.index.resolve_or_register(signature, embedding)?;
                (resolution.signature, resolution.similarity)
            }
            None => (signature, None),
        };

        self.store.ensure(&signature);
        Ok((signature, similarity))
    }

    /// Pick up to `top_n` actions for `query`
    ///
    /// With probability equal to the exploration rate a uniformly random
    /// subset is returned (in catalog order); otherwise the highest-valued
    /// actions, ties broken by catalog order.
    pub async fn select(&self, query: &str, catalog: &ActionCatalog, top_n: usize) -> Result<Selection> {
        if catalog.is_empty() {
            return Err(LearningError::catalog("cannot select from an empty catalog"));
        }
        if top_n == 0 {
            return Err(LearningError::invalid_parameter("top_n", "must be at least 1"));
        }

        let (signature, matched_similarity) = self.resolve_signature(query).await?;
        let k = top_n.min(catalog.len());
        let names: Vec<&str> = catalog.names().collect();

        let rate = self.exploration_rate();
        let (actions, explored) = {
            let mut rng = self.rng.lock();
            if rng.gen::<f64>() < rate {
                let mut picked = rand::seq::index::sample(&mut *rng, names.len(), k).into_vec();
                picked.sort_unstable();
                (picked.into_iter().map(|i| names[i].to_string()).collect::<Vec<_>>(), true)
            } else {
                (Vec::new(), false)
            }
        };

        let actions = if explored {
            actions
        } else {
            let values = self.store.read(&signature);
            let mut ranked: Vec<(&str, f64)> = names
                .iter()
                .map(|name| (*name, values.get(*name).copied().unwrap_or(0.0)))
                .collect();
            // Stable sort keeps catalog order among equal values
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            ranked.into_iter().take(k).map(|(name, _)| name.to_string()).collect()
        };

        debug!(signature = %signature, ?actions, explored, rate, "actions selected");

        Ok(Selection {
            actions,
            signature,
            explored,
            matched_similarity,
        })
    }

    pub fn store(&self) -> &Arc<QValueStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdateMode;
    use crate::embedding::HashedBagOfWordsEmbedder;

    fn selector(rate: f64) -> ActionSelector {
        let config = LearningConfig::default().with_exploration_rate(rate);
        let store = Arc::new(QValueStore::from_config(&config).unwrap());
        let index = Arc::new(SemanticIndex::new(config.similarity_threshold).unwrap());
        ActionSelector::new(store, index, &config).unwrap().with_seed(7)
    }

    fn catalog() -> ActionCatalog {
        ActionCatalog::from_names(["search", "calculator", "weather", "calendar", "email"]).unwrap()
    }

    #[tokio::test]
    async fn test_empty_catalog_rejected() {
        let selector = selector(0.0);
        let result = selector.select("q", &ActionCatalog::new(), 1).await;
        assert!(matches!(result, Err(LearningError::Catalog(_))));
    }

    #[tokio::test]
    async fn test_zero_top_n_rejected() {
        let selector = selector(0.0);
        assert!(selector.select("q", &catalog(), 0).await.is_err());
    }

    #[tokio::test]
    async fn test_exploit_ties_follow_catalog_order() {
        let selector = selector(0.0);
        let selection = selector.select("anything", &catalog(), 2).await.unwrap();
        assert_eq!(selection.actions, vec!["search", "calculator"]);
        assert!(!selection.explored);
    }

    #[tokio::test]
    async fn test_exploit_picks_highest_value() {
        let selector = selector(0.0);
        let sig = StateSignature::from_query("what is 2 + 2");
        selector.store().update(&sig, "calculator", 1.0, None).unwrap();
        selector.store().update(&sig, "search", 0.2, None).unwrap();

        let selection = selector.select("What is 2 + 2?", &catalog(), 2).await.unwrap();
        assert_eq!(selection.actions, vec!["calculator", "search"]);
        assert_eq!(selection.signature, sig);
    }

    #[tokio::test]
    async fn test_top_n_clamped_to_catalog() {
        let selector = selector(1.0);
        let selection = selector.select("q", &catalog(), 10).await.unwrap();
        assert_eq!(selection.actions.len(), 5);
        assert!(selection.explored);
    }

    #[tokio::test]
    async fn test_selection_registers_bucket() {
        let selector = selector(0.0);
        selector.select("fresh query", &catalog(), 1).await.unwrap();
        assert!(selector.store().contains(&StateSignature::from_query("fresh query")));
    }

    #[tokio::test]
    async fn test_embedder_reuses_paraphrase_bucket() {
        let config = LearningConfig::default()
            .with_exploration_rate(0.0)
            .with_similarity_threshold(0.8)
            .with_update_mode(UpdateMode::SingleStep);
        let store = Arc::new(QValueStore::from_config(&config).unwrap());
        let index = Arc::new(SemanticIndex::new(config.similarity_threshold).unwrap());
        let selector = ActionSelector::new(store, index, &config)
            .unwrap()
            .with_embedder(Arc::new(HashedBagOfWordsEmbedder::default()));

        let first = selector.select("weather forecast for Paris today", &catalog(), 1).await.unwrap();
        let second = selector.select("today weather forecast for Paris", &catalog(), 1).await.unwrap();

        assert_eq!(first.signature, second.signature);
        assert!(second.matched_similarity.is_some());
    }

    #[test]
    fn test_decay_floors_at_minimum() {
        let selector = selector(0.5);
        assert!((selector.decay_exploration(0.5).unwrap() - 0.25).abs() < 1e-12);
        for _ in 0..20 {
            selector.decay_exploration(0.5).unwrap();
        }
        assert!((selector.exploration_rate() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_decay_leaves_rate_below_floor() {
        let selector = selector(0.0);
        assert_eq!(selector.decay_exploration(0.9).unwrap(), 0.0);
    }

    #[test]
    fn test_decay_factor_range() {
        let selector = selector(0.5);
        assert!(selector.decay_exploration(0.0).is_err());
        assert!(selector.decay_exploration(1.5).is_err());
    }

    #[test]
    fn test_set_exploration_rate() {
        let selector = selector(0.5);
        selector.set_exploration_rate(0.2).unwrap();
        assert_eq!(selector.exploration_rate(), 0.2);
        assert!(selector.set_exploration_rate(-0.1).is_err());
    }

    #[tokio::test]
    async fn test_select_does_not_change_rate() {
        let selector = selector(0.3);
        for _ in 0..10 {
            selector.select("q", &catalog(), 1).await.unwrap();
        }
        assert_eq!(selector.exploration_rate(), 0.3);
    }
}

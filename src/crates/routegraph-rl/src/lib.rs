//! # routegraph-rl
//!
//! Online reinforcement learning for choosing which actions ("tools") to run
//! for a query.
//!
//! - [`ActionSelector`] picks an action subset ε-greedily from Q-values
//! - [`QValueStore`] holds per-signature action values and applies TD updates
//! - [`SemanticIndex`] maps paraphrased queries onto an existing signature
//!   through embedding cosine similarity
//! - [`RewardEngine`] scores action outcomes with a pluggable [`RewardStrategy`]
//! - [`LearningContext`] ties them together and owns snapshots
//!
//! ## Example
//!
//! ```rust
//! use routegraph_rl::{
//!     ActionCatalog, ActionOutcome, LearningConfig, LearningContext, RewardEngine,
//! };
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let ctx = LearningContext::new(LearningConfig::default())?;
//! let catalog = ActionCatalog::from_names(["search", "calculator"])?;
//! let rewards = RewardEngine::rule_based();
//!
//! let selection = ctx.selector().select("what is 12 * 7", &catalog, 1).await?;
//! for action in &selection.actions {
//!     let outcome = ActionOutcome::Success(json!("84"));
//!     let record = rewards.score("what is 12 * 7", &selection.signature, action, &outcome).await;
//!     ctx.store().update(&selection.signature, action, record.reward, None)?;
//! }
//! # Ok::<(), routegraph_rl::LearningError>(())
//! # }).unwrap();
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod index;
pub mod qstore;
pub mod reward;
pub mod selector;
pub mod signature;
pub mod snapshot;
pub mod stats;

pub use catalog::{ActionCatalog, ActionOutcome, ActionSpec};
pub use config::{LearningConfig, UpdateMode};
pub use context::{LearningContext, LearningContextBuilder};
pub use embedding::{Embedder, HashedBagOfWordsEmbedder};
pub use error::{LearningError, Result};
pub use index::{cosine_similarity, IndexEntry, SemanticIndex};
pub use qstore::{QTable, QValueStore};
pub use reward::{
    CompositeReward, OracleScoredReward, Rater, RewardEngine, RewardObserver, RewardRecord, RewardStrategy,
    RuleBasedReward, UserFeedbackReward, NEUTRAL_REWARD,
};
pub use selector::{ActionSelector, Selection};
pub use signature::StateSignature;
pub use snapshot::{LearningSnapshot, SnapshotCodec, SNAPSHOT_VERSION};
pub use stats::LearningStats;

//! The learning context: explicitly constructed, explicitly passed shared state
//!
//! One `LearningContext` is created at process start, optionally loaded from
//! a snapshot, cloned (cheaply, it is a set of `Arc`s) into every session
//! that learns, and flushed at shutdown.

use crate::config::LearningConfig;
use crate::embedding::{Embedder, HashedBagOfWordsEmbedder};
use crate::error::{LearningError, Result};
use crate::index::SemanticIndex;
use crate::qstore::QValueStore;
use crate::selector::ActionSelector;
use crate::snapshot::{LearningSnapshot, SnapshotCodec};
use crate::stats::{distinct_actions, render_readable, LearningStats};
use std::path::Path;
use std::sync::Arc;
use tooling::config::ConfigBuilder;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LearningContext {
    config: LearningConfig,
    store: Arc<QValueStore>,
    index: Arc<SemanticIndex>,
    selector: Arc<ActionSelector>,
}

/// Builder for [`LearningContext`]
pub struct LearningContextBuilder {
    config: LearningConfig,
    embedder: Option<Arc<dyn Embedder>>,
    seed: Option<u64>,
}

impl LearningContextBuilder {
    /// Embedder used when `use_embeddings` is on; defaults to [`HashedBagOfWordsEmbedder`]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Seed the selector's random source
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<LearningContext> {
        self.config.validate()?;

        let store = Arc::new(QValueStore::from_config(&self.config)?);
        let index = Arc::new(SemanticIndex::new(self.config.similarity_threshold)?);

        let mut selector = ActionSelector::new(store.clone(), index.clone(), &self.config)?;
        if self.config.use_embeddings {
            let embedder = self
                .embedder
                .unwrap_or_else(|| Arc::new(HashedBagOfWordsEmbedder::default()));
            selector = selector.with_embedder(embedder);
        }
        if let Some(seed) = self.seed {
            selector = selector.with_seed(seed);
        }

        Ok(LearningContext {
            config: self.config,
            store,
            index,
            selector: Arc::new(selector),
        })
    }
}

impl LearningContext {
    pub fn builder(config: LearningConfig) -> LearningContextBuilder {
        LearningContextBuilder {
            config,
            embedder: None,
            seed: None,
        }
    }

    /// Empty context with the default embedder
    pub fn new(config: LearningConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Build a context and load `path` if it exists
    ///
    /// A missing file yields an empty context. A corrupt one is reported and
    /// also yields an empty context; an unreadable one is an error.
    pub fn open(builder: LearningContextBuilder, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let context = builder.build()?;

        if !path.exists() {
            info!(path = %path.display(), "no learning snapshot found, starting empty");
            return Ok(context);
        }

        match context.load_file(path) {
            Ok(()) => {}
            Err(e @ LearningError::SnapshotFormat(_)) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable learning snapshot");
            }
            Err(e) => return Err(e),
        }
        Ok(context)
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<QValueStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }

    pub fn selector(&self) -> &Arc<ActionSelector> {
        &self.selector
    }

    pub fn snapshot(&self) -> LearningSnapshot {
        LearningSnapshot::new(self.store.export(), self.index.entries())
    }

    pub fn export_snapshot(&self, codec: SnapshotCodec) -> Result<Vec<u8>> {
        codec.dumps(&self.snapshot())
    }

    /// Replace all learning state with a snapshot
    ///
    /// Embeddings must match the configured embedder's dimensions. On any
    /// failure both the store and the index are left empty and
    /// [`LearningError::SnapshotFormat`] is returned. Meant for startup,
    /// before sessions run.
    pub fn import_snapshot(&self, data: &[u8], codec: SnapshotCodec) -> Result<()> {
        let result = codec.loads(data).and_then(|snapshot| {
            snapshot.validate()?;
            let entries = snapshot.index_entries();
            if let (Some(expected), Some(first)) = (self.selector.embedding_dimensions(), entries.first()) {
                if first.embedding.len() != expected {
                    return Err(LearningError::snapshot(format!(
                        "snapshot embeddings have {} dimensions, the embedder produces {}",
                        first.embedding.len(),
                        expected
                    )));
                }
            }
            self.store.import(snapshot.q_values.clone())?;
            self.index.replace(entries)
        });

        if let Err(e) = result {
            self.store.clear();
            self.index.clear();
            warn!(error = %e, "learning snapshot rejected, state reset to empty");
            return Err(match e {
                LearningError::SnapshotFormat(_) => e,
                other => LearningError::snapshot(other.to_string()),
            });
        }

        info!(states = self.store.len(), embeddings = self.index.len(), "learning snapshot imported");
        Ok(())
    }

    /// Load a snapshot file; the codec follows the extension (`.json` or binary)
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        self.import_snapshot(&data, SnapshotCodec::for_path(path))
    }

    /// Write a snapshot file, replacing any previous one
    pub fn flush(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = self.export_snapshot(SnapshotCodec::for_path(path))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &data)?;
        std::fs::rename(&tmp, path)?;

        info!(path = %path.display(), bytes = data.len(), "learning snapshot flushed");
        Ok(())
    }

    pub fn stats(&self) -> LearningStats {
        let table = self.store.export();
        LearningStats {
            total_states: table.len(),
            total_actions: distinct_actions(&table),
            non_zero_q_values: self.store.non_zero_values(),
            exploration_rate: self.selector.exploration_rate(),
            learning_rate: self.store.learning_rate(),
            use_embeddings: self.config.use_embeddings,
            cached_embeddings: self.index.len(),
        }
    }

    pub fn readable(&self) -> String {
        render_readable(&self.store.export())
    }

    pub fn export_readable(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.readable())?;
        Ok(())
    }
}

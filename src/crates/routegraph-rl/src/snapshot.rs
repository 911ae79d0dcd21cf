//! Snapshot format for the Q-value store and semantic index

use crate::error::{LearningError, Result};
use crate::index::IndexEntry;
use crate::qstore::QTable;
use crate::signature::StateSignature;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Byte encoding of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotCodec {
    /// Compact binary; round-trips every value bit for bit
    #[default]
    Bincode,
    /// Human-readable JSON
    Json,
}

impl SnapshotCodec {
    pub fn dumps(&self, snapshot: &LearningSnapshot) -> Result<Vec<u8>> {
        match self {
            Self::Bincode => bincode::serialize(snapshot).map_err(|e| LearningError::snapshot(e.to_string())),
            Self::Json => serde_json::to_vec_pretty(snapshot).map_err(|e| LearningError::snapshot(e.to_string())),
        }
    }

    pub fn loads(&self, data: &[u8]) -> Result<LearningSnapshot> {
        match self {
            Self::Bincode => bincode::deserialize(data).map_err(|e| LearningError::snapshot(e.to_string())),
            Self::Json => serde_json::from_slice(data).map_err(|e| LearningError::snapshot(e.to_string())),
        }
    }

    /// Guess the codec from a file extension, defaulting to bincode
    pub fn for_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Bincode,
        }
    }
}

/// One semantic index entry as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEmbedding {
    pub signature: String,
    pub embedding: Vec<f32>,
}

/// Full learning state: Q-values plus index entries in registration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    pub version: u32,
    pub q_values: QTable,
    pub embeddings: Vec<SnapshotEmbedding>,
}

impl LearningSnapshot {
    pub fn new(q_values: QTable, entries: Vec<IndexEntry>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            q_values,
            embeddings: entries
                .into_iter()
                .map(|e| SnapshotEmbedding {
                    signature: e.signature.as_str().to_string(),
                    embedding: e.embedding,
                })
                .collect(),
        }
    }

    /// Reject anything that would not load cleanly
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(LearningError::snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }

        for (signature, actions) in &self.q_values {
            if let Some((action, value)) = actions.iter().find(|(_, v)| !v.is_finite()) {
                return Err(LearningError::snapshot(format!(
                    "non-finite value {} for ('{}', '{}')",
                    value, signature, action
                )));
            }
        }

        let mut seen = HashSet::new();
        let dims = self.embeddings.first().map(|e| e.embedding.len());
        for entry in &self.embeddings {
            if !seen.insert(entry.signature.as_str()) {
                return Err(LearningError::snapshot(format!(
                    "duplicate signature '{}' in index",
                    entry.signature
                )));
            }
            if Some(entry.embedding.len()) != dims || entry.embedding.is_empty() {
                return Err(LearningError::snapshot(format!(
                    "embedding for '{}' has {} dimensions, expected {}",
                    entry.signature,
                    entry.embedding.len(),
                    dims.unwrap_or(0)
                )));
            }
            if entry.embedding.iter().any(|x| !x.is_finite()) {
                return Err(LearningError::snapshot(format!(
                    "embedding for '{}' contains non-finite values",
                    entry.signature
                )));
            }
        }
        Ok(())
    }

    pub fn index_entries(&self) -> Vec<IndexEntry> {
        self.embeddings
            .iter()
            .map(|e| IndexEntry {
                signature: StateSignature::from_raw(e.signature.clone()),
                embedding: e.embedding.clone(),
            })
            .collect()
    }
}

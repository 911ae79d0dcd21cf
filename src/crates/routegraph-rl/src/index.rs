//! Semantic state index: nearest-signature lookup by cosine similarity

use crate::config::check_half_open;
use crate::error::{LearningError, Result};
use crate::signature::StateSignature;
use parking_lot::RwLock;
use tracing::debug;

/// Cosine similarity of two vectors
///
/// Mismatched lengths, empty vectors and zero vectors all yield 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A registered signature and its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub signature: StateSignature,
    pub embedding: Vec<f32>,
}

/// Result of [`SemanticIndex::resolve_or_register`]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The signature whose Q-value bucket should be used
    pub signature: StateSignature,
    /// Similarity to the matched entry, when an existing one was reused
    pub similarity: Option<f64>,
}

/// Registered embeddings, scanned linearly on lookup
///
/// Grows with the number of distinct signatures; eviction is left to the
/// caller. A match only redirects which bucket is used, buckets are never
/// merged.
#[derive(Debug)]
pub struct SemanticIndex {
    threshold: f64,
    entries: RwLock<Vec<IndexEntry>>,
}

impl SemanticIndex {
    /// Create an index; `threshold` must be in `(0, 1]`
    pub fn new(threshold: f64) -> Result<Self> {
        check_half_open("similarity_threshold", threshold)?;
        Ok(Self {
            threshold,
            entries: RwLock::new(Vec::new()),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Signature of the closest entry at or above the threshold
    ///
    /// Equal similarities resolve to the earliest registration.
    pub fn resolve(&self, embedding: &[f32]) -> Option<StateSignature> {
        let entries = self.entries.read();
        Self::best_match(&entries, embedding, self.threshold).map(|(i, _)| entries[i].signature.clone())
    }

    /// Register an embedding for a signature
    ///
    /// Returns `false`, leaving the index unchanged, when the signature is
    /// already present.
    pub fn register(&self, signature: StateSignature, embedding: Vec<f32>) -> Result<bool> {
        let mut entries = self.entries.write();
        Self::insert(&mut entries, signature, embedding)
    }

    /// Resolve, registering `signature` when nothing is close enough
    ///
    /// Lookup and registration happen under one write lock, so two sessions
    /// racing on the same new paraphrase cannot create two buckets for it.
    pub fn resolve_or_register(&self, signature: StateSignature, embedding: Vec<f32>) -> Result<Resolution> {
        let mut entries = self.entries.write();

        if let Some((i, similarity)) = Self::best_match(&entries, &embedding, self.threshold) {
            let matched = entries[i].signature.clone();
            debug!(query = %signature, matched = %matched, similarity, "semantic index hit");
            return Ok(Resolution {
                signature: matched,
                similarity: Some(similarity),
            });
        }

        // Same key, dissimilar embedding: never share the bucket
        let mut candidate = signature.clone();
        let mut n = 1;
        while !Self::insert(&mut entries, candidate.clone(), embedding.clone())? {
            n += 1;
            candidate = signature.variant(n);
        }
        if n > 1 {
            debug!(query = %signature, registered = %candidate, "signature collision, registered a variant");
        }
        Ok(Resolution {
            signature: candidate,
            similarity: None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Dimension shared by every entry, if any are registered
    pub fn dimensions(&self) -> Option<usize> {
        self.entries.read().first().map(|e| e.embedding.len())
    }

    /// Copy of all entries in registration order
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.entries.read().clone()
    }

    /// Replace all entries
    ///
    /// Entries must be unique, finite and of one dimension. On error the
    /// index is left empty.
    pub fn replace(&self, new_entries: Vec<IndexEntry>) -> Result<()> {
        let mut entries = self.entries.write();
        entries.clear();

        let mut staged = Vec::with_capacity(new_entries.len());
        for entry in new_entries {
            if entry.embedding.iter().any(|x| !x.is_finite()) {
                return Err(LearningError::snapshot(format!(
                    "embedding for '{}' contains non-finite values",
                    entry.signature
                )));
            }
            match Self::insert(&mut staged, entry.signature.clone(), entry.embedding) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(LearningError::snapshot(format!(
                        "duplicate signature '{}' in index",
                        entry.signature
                    )))
                }
                Err(e) => return Err(LearningError::snapshot(e.to_string())),
            }
        }

        *entries = staged;
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn best_match(entries: &[IndexEntry], embedding: &[f32], threshold: f64) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in entries.iter().enumerate() {
            let similarity = cosine_similarity(&entry.embedding, embedding);
            if similarity >= threshold && best.map_or(true, |(_, s)| similarity > s) {
                best = Some((i, similarity));
            }
        }
        best
    }

    fn insert(entries: &mut Vec<IndexEntry>, signature: StateSignature, embedding: Vec<f32>) -> Result<bool> {
        if embedding.is_empty() {
            return Err(LearningError::embedding("cannot register an empty embedding"));
        }
        if let Some(first) = entries.first() {
            if first.embedding.len() != embedding.len() {
                return Err(LearningError::embedding(format!(
                    "embedding has {} dimensions, index holds {}",
                    embedding.len(),
                    first.embedding.len()
                )));
            }
        }
        if entries.iter().any(|e| e.signature == signature) {
            return Ok(false);
        }
        entries.push(IndexEntry { signature, embedding });
        Ok(true)
    }
}

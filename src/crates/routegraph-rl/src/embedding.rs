//! Text embedders

use crate::error::Result;
use async_trait::async_trait;

/// Converts text into a fixed-size vector for similarity lookup
///
/// Remote model clients implement this the same way the bundled
/// [`HashedBagOfWordsEmbedder`] does; the semantic index only needs
/// vectors of a consistent dimension.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Size of every vector this embedder produces
    fn dimensions(&self) -> usize;
}

/// Deterministic embedder: hashed token counts, L2-normalized
///
/// Queries sharing most of their words land close together; it needs no
/// model and produces identical vectors across processes, which keeps
/// snapshots meaningful after a restart.
#[derive(Debug, Clone)]
pub struct HashedBagOfWordsEmbedder {
    dims: usize,
}

impl HashedBagOfWordsEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 256;

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Synchronous form of [`Embedder::embed`]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.as_bytes());
            let idx = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-6 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashedBagOfWordsEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashedBagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// 64-bit FNV-1a
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

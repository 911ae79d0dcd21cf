//! State signatures: normalized keys into the Q-value store

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Longest signature kept, in characters
pub const MAX_SIGNATURE_CHARS: usize = 256;

/// Hex digits of the digest appended to truncated signatures
const DIGEST_HEX_CHARS: usize = 16;

/// A normalized representation of a query
///
/// Normalization lowercases, replaces punctuation with spaces and collapses
/// whitespace, so trivially different spellings of the same query share a
/// key even without embeddings. Text longer than [`MAX_SIGNATURE_CHARS`] is
/// cut short and suffixed with a SHA-256 digest of the full normalized
/// text, so distinct long queries keep distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSignature(String);

impl StateSignature {
    pub fn from_query(query: &str) -> Self {
        let cleaned: String = query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        let normalized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.chars().count() <= MAX_SIGNATURE_CHARS {
            return Self(normalized);
        }

        let digest = format!("{:x}", Sha256::digest(normalized.as_bytes()));
        let keep = MAX_SIGNATURE_CHARS - DIGEST_HEX_CHARS - 1;
        let prefix: String = normalized.chars().take(keep).collect();
        Self(format!("{}#{}", prefix.trim_end(), &digest[..DIGEST_HEX_CHARS]))
    }

    /// A key distinct from `self`, for a query whose normalized text
    /// collides with an unrelated registered one
    pub fn variant(&self, n: usize) -> Self {
        Self(format!("{}~{}", self.0, n))
    }

    /// Wrap an already-normalized key, as stored in a snapshot
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StateSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateSignature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//! Content hashes and verification checkpoints.

use super::MigrationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of an item's canonical encoding, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hashes `key` and `content` as `<decimal key length>:<key><content>`.
    #[must_use]
    pub fn digest(key: &str, content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{key}", key.len()));
        hasher.update(content);
        Self(
            hasher
                .finalize()
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect(),
        )
    }

    /// Wraps a persisted hex digest.
    #[must_use]
    pub const fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append-only comparison record of one verified item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyCheckpoint {
    /// Plan that produced the checkpoint.
    pub migration_id: MigrationId,
    /// Item key, `partition/key`.
    pub item_key: String,
    /// Source digest; `None` when the item was absent.
    pub source_hash: Option<ContentHash>,
    /// Target digest; `None` when the item was absent.
    pub target_hash: Option<ContentHash>,
    /// Whether both sides were present and equal.
    pub matched: bool,
    /// When the comparison was made.
    pub checked_at: DateTime<Utc>,
}

impl ConsistencyCheckpoint {
    /// Compares two optional digests.
    #[must_use]
    pub fn compare(
        migration_id: MigrationId,
        item_key: String,
        source_hash: Option<ContentHash>,
        target_hash: Option<ContentHash>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let matched = source_hash.is_some() && source_hash == target_hash;
        Self {
            migration_id,
            item_key,
            source_hash,
            target_hash,
            matched,
            checked_at,
        }
    }
}

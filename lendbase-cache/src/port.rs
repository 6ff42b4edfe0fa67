//! Cache port: the abstract keyed blob store
//!
//! The repository protocol talks to the cache exclusively through this
//! trait. Keys follow the `kind:id` layout; values are the encoded entity
//! or a placeholder marking a backend-confirmed absence (penetration
//! defence). The port never consults the backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lendbase_core::StoreResult;

/// Default TTL for negative (placeholder) entries, fixed across kinds.
pub const DEFAULT_PLACEHOLDER_TTL: Duration = Duration::from_secs(600);

/// A cache lookup that found something: either the encoded entity or a
/// placeholder recording that the backend has confirmed the identity
/// absent. A miss is `None` at the call site, so the three outcomes stay
/// distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Encoded entity bytes.
    Value(Vec<u8>),
    /// Negative marker: known absent until the placeholder TTL lapses.
    Placeholder,
}

impl CacheEntry {
    /// Whether this entry is the negative marker.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

/// Abstract keyed blob store with per-entry TTL.
///
/// Implementations must be thread-safe. All operations are idempotent:
/// `set` over an existing key replaces it, `delete` of an absent key
/// succeeds. Errors are `StoreError::CacheFailure`; the repository logs
/// and degrades rather than failing reads on them.
#[async_trait]
pub trait BlobCache: Send + Sync {
    /// Look up one key. `Ok(None)` is a miss; a placeholder hit is
    /// `Ok(Some(CacheEntry::Placeholder))`.
    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>>;

    /// Look up many keys, returning the value hits only. Misses and
    /// placeholder entries are silently omitted; callers that need to
    /// distinguish a placeholder from a cold miss probe with [`get`].
    ///
    /// [`get`]: BlobCache::get
    async fn multi_get(&self, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>>;

    /// Store one encoded entity. A serialization or I/O failure must
    /// surface as an error, never degrade to a silent no-op.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Store many encoded entities under one TTL.
    async fn multi_set(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> StoreResult<()>;

    /// Remove one key. Succeeds when the key is absent.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Store the negative marker for a backend-confirmed absent identity.
    async fn set_placeholder(&self, key: &str, ttl: Duration) -> StoreResult<()>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of value hits.
    pub hits: u64,
    /// Number of misses (including expired entries).
    pub misses: u64,
    /// Number of placeholder hits.
    pub placeholder_hits: u64,
    /// Number of entries dropped on expiry.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the value hit rate (0.0 to 1.0). Placeholder hits count
    /// as hits: they answer the caller without a backend round-trip.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits + self.placeholder_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

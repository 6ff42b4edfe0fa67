//! In-memory cache backend
//!
//! A `DashMap`-backed implementation of the cache port with lazy TTL
//! expiry: an entry past its deadline is dropped when it is next read.
//! Time comes from the injected `Clock` so tests can cross TTL deadlines
//! without sleeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use lendbase_core::{Clock, StoreResult, SystemClock, Timestamp};

use crate::port::{BlobCache, CacheEntry, CacheStats};

/// One stored slot: encoded bytes, or `None` for the placeholder marker.
#[derive(Debug, Clone)]
struct Slot {
    bytes: Option<Vec<u8>>,
    expires_at: Timestamp,
}

/// In-process cache backend.
///
/// Suitable as the per-process object cache of the repository protocol;
/// it provides no cross-process invalidation, which matches the protocol's
/// TTL-bounded coherence contract.
pub struct MemoryCache {
    slots: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    placeholder_hits: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    /// Create a cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            placeholder_hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Snapshot the usage counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            placeholder_hits: self.placeholder_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Number of live entries (expired slots may still be counted until
    /// their next read).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn deadline(&self, ttl: Duration) -> Timestamp {
        self.clock.now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0))
    }

    /// Read one slot, dropping it if expired.
    fn live_slot(&self, key: &str) -> Option<Slot> {
        let now = self.clock.now();
        if let Some(slot) = self.slots.get(key) {
            if slot.expires_at > now {
                return Some(slot.clone());
            }
        } else {
            return None;
        }
        // Expired: remove outside the read guard.
        self.slots.remove(key);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        None
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobCache for MemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        match self.live_slot(key) {
            Some(Slot {
                bytes: Some(bytes), ..
            }) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(CacheEntry::Value(bytes)))
            }
            Some(Slot { bytes: None, .. }) => {
                self.placeholder_hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(CacheEntry::Placeholder))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn multi_get(&self, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>> {
        let mut hits = HashMap::with_capacity(keys.len());
        for key in keys {
            // Placeholders are omitted: multi_get reports value hits only.
            if let Some(Slot {
                bytes: Some(bytes), ..
            }) = self.live_slot(key)
            {
                self.hits.fetch_add(1, Ordering::Relaxed);
                hits.insert(key.clone(), bytes);
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(hits)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                bytes: Some(value),
                expires_at: self.deadline(ttl),
            },
        );
        Ok(())
    }

    async fn multi_set(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> StoreResult<()> {
        let expires_at = self.deadline(ttl);
        for (key, value) in entries {
            self.slots.insert(
                key,
                Slot {
                    bytes: Some(value),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.slots.remove(key);
        Ok(())
    }

    async fn set_placeholder(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                bytes: None,
                expires_at: self.deadline(ttl),
            },
        );
        Ok(())
    }
}

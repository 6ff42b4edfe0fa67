//! The cache-coherent repository protocol
//!
//! One repository per entity kind, generic over the backend so the
//! protocol itself is testable without a database. Reads go through the
//! cache with per-identity single-flight coalescing and negative
//! placeholders; writes go to the backend first and invalidate the cache
//! afterwards. Cache failures degrade reads to backend fetches and are
//! never surfaced on write paths.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lendbase_cache::{BlobCache, CacheEntry, SingleFlight};
use lendbase_core::{EntityId, Predicate, StoreError, StoreResult, UNSET_ID};

use crate::backend::{Backend, PgBackend};
use crate::config::RepoConfig;
use crate::patch::Patch;
use crate::record::Record;
use crate::translate;

/// One page of a predicate query plus the unpaged total.
///
/// `total` is zero when the predicate carried the count-suppression
/// sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<E> {
    pub total: u64,
    pub records: Vec<E>,
}

/// Cache-coherent data access for one entity kind.
pub struct Repository<E: Record, B: Backend<E>> {
    backend: Arc<B>,
    cache: Option<Arc<dyn BlobCache>>,
    flight: SingleFlight<E>,
    config: RepoConfig,
}

impl<E: Record, B: Backend<E>> Repository<E, B> {
    /// Create a cache-less repository; every read goes to the backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            cache: None,
            flight: SingleFlight::new(),
            config: RepoConfig::default(),
        }
    }

    /// Attach a cache.
    pub fn with_cache(mut self, cache: Arc<dyn BlobCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the tuning knobs.
    pub fn with_config(mut self, config: RepoConfig) -> Self {
        self.config = config;
        self
    }

    fn cache(&self) -> Option<&dyn BlobCache> {
        if self.config.cache_enabled {
            self.cache.as_deref()
        } else {
            None
        }
    }

    /// TTL for cached rows of this kind; a zeroed descriptor TTL falls
    /// back to the configured default.
    fn entry_ttl(&self) -> Duration {
        let ttl = E::descriptor().cache_ttl;
        if ttl.is_zero() {
            self.config.default_ttl
        } else {
            ttl
        }
    }

    /// Apply the configured operation deadline, if any. A fired deadline
    /// drops the inner future at its current suspension point, so a
    /// cancelled read never reaches its cache-populate step and a
    /// cancelled write never reaches its cache-invalidate step.
    async fn with_deadline<T, Fut>(&self, fut: Fut) -> StoreResult<T>
    where
        Fut: Future<Output = StoreResult<T>>,
    {
        match self.config.op_timeout {
            None => fut.await,
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Cancelled),
            },
        }
    }

    fn encode(entity: &E) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(entity).map_err(|e| StoreError::cache(format!("encode failed: {e}")))
    }

    /// Decode a cached blob; an undecodable entry (e.g. after a schema
    /// change) is logged and treated as a miss.
    fn decode(key: &str, bytes: &[u8]) -> Option<E> {
        match serde_json::from_slice(bytes) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!("dropping undecodable cache entry '{key}': {e}");
                None
            }
        }
    }

    /// Load one entity by identity through the cache.
    ///
    /// A placeholder hit answers `NotFound` without a backend round-trip.
    /// On a miss, concurrent callers for the same identity coalesce onto
    /// one backend load; the loader populates the cache (value or
    /// placeholder) before publishing.
    pub async fn get_by_id(&self, id: EntityId) -> StoreResult<E> {
        if id == UNSET_ID {
            return Err(StoreError::unset_id());
        }
        self.with_deadline(self.get_by_id_inner(id)).await
    }

    async fn get_by_id_inner(&self, id: EntityId) -> StoreResult<E> {
        let cache = match self.cache() {
            None => {
                return match self.backend.fetch_one(id).await? {
                    Some(entity) => Ok(entity),
                    None => Err(StoreError::NotFound),
                };
            }
            Some(cache) => cache,
        };

        let key = E::cache_key_of(id);
        match cache.get(&key).await {
            Ok(Some(CacheEntry::Value(bytes))) => {
                if let Some(entity) = Self::decode(&key, &bytes) {
                    tracing::debug!("cache hit for '{key}'");
                    return Ok(entity);
                }
                // Undecodable entry: fall through to a backend load.
            }
            Ok(Some(CacheEntry::Placeholder)) => {
                tracing::debug!("placeholder hit for '{key}'");
                return Err(StoreError::NotFound);
            }
            Ok(None) => {
                tracing::debug!("cache miss for '{key}'");
            }
            Err(e) => {
                // Degrade to a coalesced backend load; no populate step,
                // the cache is not answering anyway.
                tracing::warn!("cache read for '{key}' failed, going to backend: {e}");
                let loaded = self
                    .flight
                    .run(id, || async { self.backend.fetch_one(id).await })
                    .await?;
                return loaded.ok_or(StoreError::NotFound);
            }
        }

        let loaded = self
            .flight
            .run(id, || async {
                let loaded = self.backend.fetch_one(id).await?;
                match &loaded {
                    Some(entity) => match Self::encode(entity) {
                        Ok(bytes) => {
                            if let Err(e) = cache.set(&key, bytes, self.entry_ttl()).await {
                                tracing::warn!("cache populate for '{key}' failed: {e}");
                            }
                        }
                        Err(e) => {
                            tracing::warn!("cache encode for '{key}' failed: {e}");
                        }
                    },
                    None => {
                        if let Err(e) = cache
                            .set_placeholder(&key, self.config.placeholder_ttl)
                            .await
                        {
                            tracing::warn!("placeholder write for '{key}' failed: {e}");
                        }
                    }
                }
                Ok(loaded)
            })
            .await?;

        loaded.ok_or(StoreError::NotFound)
    }

    /// Load many entities by identity, fanning cache misses into one
    /// backend select. The result maps identity to entity; absent and
    /// soft-deleted identities are simply not present.
    pub async fn get_by_ids(&self, ids: &[EntityId]) -> StoreResult<HashMap<EntityId, E>> {
        if ids.is_empty() {
            return Err(StoreError::invalid_argument("empty id list"));
        }
        if ids.contains(&UNSET_ID) {
            return Err(StoreError::unset_id());
        }
        let unique: Vec<EntityId> = {
            let mut seen = HashSet::new();
            ids.iter().copied().filter(|id| seen.insert(*id)).collect()
        };
        self.with_deadline(self.get_by_ids_inner(unique)).await
    }

    async fn get_by_ids_inner(&self, ids: Vec<EntityId>) -> StoreResult<HashMap<EntityId, E>> {
        let cache = match self.cache() {
            None => {
                let rows = self.backend.fetch_many(&ids).await?;
                return Ok(rows.into_iter().map(|e| (e.id(), e)).collect());
            }
            Some(cache) => cache,
        };

        let keys: Vec<String> = ids.iter().map(|&id| E::cache_key_of(id)).collect();
        let mut found: HashMap<EntityId, E> = HashMap::with_capacity(ids.len());
        let hits = match cache.multi_get(&keys).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("batch cache read failed, going to backend: {e}");
                HashMap::new()
            }
        };
        let mut to_load = Vec::new();
        for (&id, key) in ids.iter().zip(&keys) {
            match hits.get(key).and_then(|bytes| Self::decode(key, bytes)) {
                Some(entity) => {
                    found.insert(id, entity);
                }
                None => to_load.push(id),
            }
        }

        // multi_get omits placeholders; probe each miss once so known
        // absences don't re-enter the backend select.
        let mut backend_ids = Vec::with_capacity(to_load.len());
        for id in to_load {
            match cache.get(&E::cache_key_of(id)).await {
                Ok(Some(CacheEntry::Placeholder)) => {}
                Ok(_) => backend_ids.push(id),
                Err(e) => {
                    tracing::warn!("cache probe for id {id} failed: {e}");
                    backend_ids.push(id);
                }
            }
        }
        if backend_ids.is_empty() {
            return Ok(found);
        }

        let loaded = self.backend.fetch_many(&backend_ids).await?;
        let mut entries = Vec::with_capacity(loaded.len());
        for entity in &loaded {
            let key = E::cache_key_of(entity.id());
            match Self::encode(entity) {
                Ok(bytes) => entries.push((key, bytes)),
                Err(e) => tracing::warn!("cache encode for '{key}' failed: {e}"),
            }
        }
        if let Err(e) = cache.multi_set(entries, self.entry_ttl()).await {
            tracing::warn!("batch cache populate failed: {e}");
        }
        let returned: HashSet<EntityId> = loaded.iter().map(|e| e.id()).collect();
        for &id in &backend_ids {
            if !returned.contains(&id) {
                let key = E::cache_key_of(id);
                if let Err(e) = cache
                    .set_placeholder(&key, self.config.placeholder_ttl)
                    .await
                {
                    tracing::warn!("placeholder write for '{key}' failed: {e}");
                }
            }
        }
        for entity in loaded {
            found.insert(entity.id(), entity);
        }
        Ok(found)
    }

    /// Run a paginated predicate query. The predicate is validated here;
    /// an invalid one never reaches the backend. Unless the predicate
    /// carries the count-suppression sentinel, the count runs first and an
    /// empty match short-circuits the page select. Predicate reads never
    /// touch the identity cache.
    pub async fn get_by_predicate(&self, pred: &Predicate) -> StoreResult<PageResult<E>> {
        translate::validate(E::descriptor(), pred, self.config.max_page_size)?;
        self.with_deadline(async {
            let total = if pred.skips_count() {
                0
            } else {
                let total = self.backend.count(pred).await?;
                if total == 0 {
                    return Ok(PageResult {
                        total: 0,
                        records: Vec::new(),
                    });
                }
                total
            };
            let records = self.backend.select(pred).await?;
            Ok(PageResult { total, records })
        })
        .await
    }

    /// Keyset backward page: up to `limit` live rows with identity below
    /// `last_id`. Pass `EntityId::MAX` to start from the newest row.
    pub async fn get_after(
        &self,
        last_id: EntityId,
        limit: u64,
        sort: Option<&str>,
    ) -> StoreResult<Vec<E>> {
        if limit == 0 {
            return Err(StoreError::invalid_argument("zero page limit"));
        }
        if let Some(sort) = sort {
            translate::render_sort(E::descriptor().filterable, sort)?;
        }
        self.with_deadline(self.backend.select_after(last_id, limit, sort))
            .await
    }

    /// Return the first row matching a predicate, or `NotFound`.
    pub async fn get_one(&self, pred: &Predicate) -> StoreResult<E> {
        translate::validate(E::descriptor(), pred, self.config.max_page_size)?;
        let row = self.with_deadline(self.backend.select_first(pred)).await?;
        row.ok_or(StoreError::NotFound)
    }

    /// Insert a new entity; the assigned identity and timestamps are
    /// written back into it. The cache is not pre-warmed.
    pub async fn create(&self, entity: &mut E) -> StoreResult<()> {
        if entity.id() != UNSET_ID {
            return Err(StoreError::invalid_argument(format!(
                "entity already persisted with id {}",
                entity.id()
            )));
        }
        self.with_deadline(self.backend.insert(entity)).await
    }

    /// Apply a partial update to one identity; returns affected rows
    /// (zero when the identity is absent or soft-deleted). The cached
    /// entry for the identity is invalidated after the backend write,
    /// whether or not a row matched.
    pub async fn update_by_id(&self, id: EntityId, patch: &Patch) -> StoreResult<u64> {
        if id == UNSET_ID {
            return Err(StoreError::unset_id());
        }
        patch.validate(E::descriptor().updatable)?;
        let rows = self.with_deadline(self.backend.update(id, patch)).await?;
        self.invalidate(&[id]).await;
        Ok(rows)
    }

    /// Soft-delete one identity; returns affected rows.
    pub async fn delete_by_id(&self, id: EntityId) -> StoreResult<u64> {
        self.delete_by_ids(&[id]).await
    }

    /// Soft-delete many identities; returns affected rows. Each cached
    /// entry is invalidated after the backend write.
    pub async fn delete_by_ids(&self, ids: &[EntityId]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Err(StoreError::invalid_argument("empty id list"));
        }
        if ids.contains(&UNSET_ID) {
            return Err(StoreError::unset_id());
        }
        let rows = self.with_deadline(self.backend.soft_delete(ids)).await?;
        self.invalidate(ids).await;
        Ok(rows)
    }

    /// Drop the cached entries for the given identities. Failures are
    /// logged, never surfaced: the entries age out at the TTL anyway.
    async fn invalidate(&self, ids: &[EntityId]) {
        let cache = match self.cache() {
            Some(cache) => cache,
            None => return,
        };
        for &id in ids {
            let key = E::cache_key_of(id);
            if let Err(e) = cache.delete(&key).await {
                tracing::warn!("cache invalidation for '{key}' failed: {e}");
            }
        }
    }
}

impl<E: Record> Repository<E, PgBackend<E>> {
    /// Insert within a caller-supplied transaction. Visibility follows
    /// the transaction; no cache interaction (a new row has no entry).
    pub async fn create_within(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        entity: &mut E,
    ) -> StoreResult<()> {
        if entity.id() != UNSET_ID {
            return Err(StoreError::invalid_argument(format!(
                "entity already persisted with id {}",
                entity.id()
            )));
        }
        self.backend.insert_within(tx, entity).await
    }

    /// Partial update within a caller-supplied transaction. The cache
    /// entry is invalidated immediately; until the caller commits, other
    /// readers may re-cache the pre-transaction row, bounded by the TTL.
    pub async fn update_within(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        id: EntityId,
        patch: &Patch,
    ) -> StoreResult<u64> {
        if id == UNSET_ID {
            return Err(StoreError::unset_id());
        }
        patch.validate(E::descriptor().updatable)?;
        let rows = self.backend.update_within(tx, id, patch).await?;
        self.invalidate(&[id]).await;
        Ok(rows)
    }

    /// Soft delete within a caller-supplied transaction.
    pub async fn delete_within(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        ids: &[EntityId],
    ) -> StoreResult<u64> {
        if ids.is_empty() {
            return Err(StoreError::invalid_argument("empty id list"));
        }
        if ids.contains(&UNSET_ID) {
            return Err(StoreError::unset_id());
        }
        let rows = self.backend.soft_delete_within(tx, ids).await?;
        self.invalidate(ids).await;
        Ok(rows)
    }
}

//! The abstract query executor and its Postgres implementation
//!
//! The repository protocol talks to the relational store through the
//! `Backend` trait, so the protocol tests run against a mock. `PgBackend`
//! is the production implementation: one entity kind over the shared
//! deadpool pool, all statements parameterised, all driver errors mapped
//! to the taxonomy at this boundary.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool, Transaction};
use lendbase_core::{Clock, EntityId, Predicate, SqlValue, StoreError, StoreResult, SystemClock};
use tokio_postgres::error::SqlState;

use crate::param::SqlParam;
use crate::patch::Patch;
use crate::record::Record;
use crate::translate;

/// Abstract query executor for one entity kind.
///
/// Predicates handed to `select`/`count`/`select_first` have already been
/// validated by the repository; implementations translate them without
/// re-validating. Patches likewise arrive pre-validated against the
/// updatable set.
#[async_trait]
pub trait Backend<E: Record>: Send + Sync {
    /// Load one live entity by identity.
    async fn fetch_one(&self, id: EntityId) -> StoreResult<Option<E>>;

    /// Load the live entities among `ids` in one query.
    async fn fetch_many(&self, ids: &[EntityId]) -> StoreResult<Vec<E>>;

    /// Run the paginated select for a predicate.
    async fn select(&self, pred: &Predicate) -> StoreResult<Vec<E>>;

    /// Count the live rows matching a predicate (paging ignored).
    async fn count(&self, pred: &Predicate) -> StoreResult<u64>;

    /// Return the first live row matching a predicate.
    async fn select_first(&self, pred: &Predicate) -> StoreResult<Option<E>>;

    /// Keyset page: up to `limit` live rows with identity strictly below
    /// `last_id`, ordered by the validated sort clause (identity
    /// descending by default).
    async fn select_after(
        &self,
        last_id: EntityId,
        limit: u64,
        sort: Option<&str>,
    ) -> StoreResult<Vec<E>>;

    /// Insert the entity, writing the assigned identity and timestamps
    /// back into it.
    async fn insert(&self, entity: &mut E) -> StoreResult<()>;

    /// Apply a partial update to one identity; returns affected rows.
    async fn update(&self, id: EntityId, patch: &Patch) -> StoreResult<u64>;

    /// Soft-delete the given identities; returns affected rows.
    async fn soft_delete(&self, ids: &[EntityId]) -> StoreResult<u64>;
}

/// Map a driver error to the taxonomy. Constraint violations become
/// `Conflict`; everything else is logged here and surfaces as a generic
/// `BackendUnavailable` to avoid leaking statement internals.
fn map_db_err(e: tokio_postgres::Error) -> StoreError {
    if let Some(state) = e.code() {
        if *state == SqlState::UNIQUE_VIOLATION
            || *state == SqlState::FOREIGN_KEY_VIOLATION
            || *state == SqlState::CHECK_VIOLATION
            || *state == SqlState::EXCLUSION_VIOLATION
        {
            return StoreError::conflict(e.to_string());
        }
    }
    tracing::error!("database error: {e:?}");
    StoreError::backend("database operation failed")
}

/// Postgres-backed query executor for one entity kind.
pub struct PgBackend<E: Record> {
    pool: Pool,
    clock: Arc<dyn Clock>,
    max_page_size: u64,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Record> PgBackend<E> {
    /// Create a backend on the shared pool with the system clock.
    pub fn new(pool: Pool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Create a backend with an injected clock.
    pub fn with_clock(pool: Pool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            max_page_size: 500,
            _marker: PhantomData,
        }
    }

    /// Set the page size cap (keep it aligned with the repository's
    /// `RepoConfig::max_page_size`).
    pub fn with_max_page_size(mut self, cap: u64) -> Self {
        self.max_page_size = cap;
        self
    }

    /// Borrow a pooled client, e.g. to open a caller-owned transaction.
    pub async fn client(&self) -> StoreResult<Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!("connection pool error: {e:?}");
            StoreError::backend("failed to acquire database connection")
        })
    }

    fn build_insert(entity: &E) -> (String, Vec<SqlParam>) {
        let columns = E::insert_columns();
        let values = entity.insert_values();
        debug_assert_eq!(columns.len(), values.len());
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
            E::descriptor().table,
            columns.join(", "),
            placeholders.join(", "),
        );
        (sql, values)
    }

    fn build_update(&self, id: EntityId, patch: &Patch) -> StoreResult<(String, Vec<SqlParam>)> {
        let mut params = Vec::new();
        let mut sets = Vec::new();
        for (column, value) in patch.entries() {
            match value {
                // NULL assignments carry no parameter; the column name was
                // validated against the updatable set upstream.
                SqlValue::Null => sets.push(format!("{column} = NULL")),
                other => {
                    params.push(SqlParam::try_from(other.clone())?);
                    sets.push(format!("{column} = ${}", params.len()));
                }
            }
        }
        params.push(SqlParam::Timestamp(self.clock.now()));
        sets.push(format!("updated_at = ${}", params.len()));
        params.push(SqlParam::Long(id as i64));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ${} AND deleted_at IS NULL",
            E::descriptor().table,
            sets.join(", "),
            params.len(),
        );
        Ok((sql, params))
    }

    fn build_soft_delete(&self, ids: &[EntityId]) -> (String, Vec<SqlParam>) {
        let ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
        let sql = format!(
            "UPDATE {} SET deleted_at = $1, updated_at = $1 WHERE id = ANY($2) AND deleted_at IS NULL",
            E::descriptor().table,
        );
        (
            sql,
            vec![
                SqlParam::Timestamp(self.clock.now()),
                SqlParam::LongList(ids),
            ],
        )
    }

    fn stamp_new(&self, entity: &mut E) {
        let now = self.clock.now();
        let meta = entity.meta_mut();
        meta.created_at = now;
        meta.updated_at = now;
        meta.deleted_at = None;
    }

    // ========================================================================
    // TRANSACTIONAL VARIANTS
    // ========================================================================
    //
    // These execute under a caller-supplied transaction handle; the handle
    // is never created here, and commit/rollback stay with the caller.

    /// Insert within a caller-supplied transaction.
    pub async fn insert_within(
        &self,
        tx: &Transaction<'_>,
        entity: &mut E,
    ) -> StoreResult<()> {
        self.stamp_new(entity);
        let (sql, params) = Self::build_insert(entity);
        let refs = SqlParam::as_refs(&params);
        let row = tx.query_one(&sql, &refs[..]).await.map_err(map_db_err)?;
        let id: i64 = row
            .try_get(0)
            .map_err(|e| StoreError::backend(format!("bad RETURNING id: {e}")))?;
        entity.meta_mut().id = id as EntityId;
        Ok(())
    }

    /// Partial update within a caller-supplied transaction.
    pub async fn update_within(
        &self,
        tx: &Transaction<'_>,
        id: EntityId,
        patch: &Patch,
    ) -> StoreResult<u64> {
        let (sql, params) = self.build_update(id, patch)?;
        let refs = SqlParam::as_refs(&params);
        tx.execute(&sql, &refs[..]).await.map_err(map_db_err)
    }

    /// Soft delete within a caller-supplied transaction.
    pub async fn soft_delete_within(
        &self,
        tx: &Transaction<'_>,
        ids: &[EntityId],
    ) -> StoreResult<u64> {
        let (sql, params) = self.build_soft_delete(ids);
        let refs = SqlParam::as_refs(&params);
        tx.execute(&sql, &refs[..]).await.map_err(map_db_err)
    }
}

#[async_trait]
impl<E: Record> Backend<E> for PgBackend<E> {
    async fn fetch_one(&self, id: EntityId) -> StoreResult<Option<E>> {
        let desc = E::descriptor();
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND deleted_at IS NULL",
            desc.columns.join(", "),
            desc.table,
        );
        let conn = self.client().await?;
        let row = conn
            .query_opt(&sql, &[&(id as i64)])
            .await
            .map_err(map_db_err)?;
        row.map(|r| E::from_row(&r)).transpose()
    }

    async fn fetch_many(&self, ids: &[EntityId]) -> StoreResult<Vec<E>> {
        let desc = E::descriptor();
        let ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ANY($1) AND deleted_at IS NULL",
            desc.columns.join(", "),
            desc.table,
        );
        let conn = self.client().await?;
        let rows = conn.query(&sql, &[&ids]).await.map_err(map_db_err)?;
        rows.iter().map(E::from_row).collect()
    }

    async fn select(&self, pred: &Predicate) -> StoreResult<Vec<E>> {
        let translated = translate::translate(E::descriptor(), pred, self.max_page_size)?;
        let refs = SqlParam::as_refs(&translated.select_params);
        let conn = self.client().await?;
        let rows = conn
            .query(&translated.select_sql, &refs[..])
            .await
            .map_err(map_db_err)?;
        rows.iter().map(E::from_row).collect()
    }

    async fn count(&self, pred: &Predicate) -> StoreResult<u64> {
        let desc = E::descriptor();
        let mut params = Vec::new();
        let where_clause =
            translate::render_where(desc.filterable, desc.max_or_depth, pred, &mut params)?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", desc.table, where_clause);
        let refs = SqlParam::as_refs(&params);
        let conn = self.client().await?;
        let row = conn.query_one(&sql, &refs[..]).await.map_err(map_db_err)?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| StoreError::backend(format!("bad count: {e}")))?;
        Ok(count as u64)
    }

    async fn select_first(&self, pred: &Predicate) -> StoreResult<Option<E>> {
        let (sql, params) = translate::translate_first(E::descriptor(), pred)?;
        let refs = SqlParam::as_refs(&params);
        let conn = self.client().await?;
        let row = conn.query_opt(&sql, &refs[..]).await.map_err(map_db_err)?;
        row.map(|r| E::from_row(&r)).transpose()
    }

    async fn select_after(
        &self,
        last_id: EntityId,
        limit: u64,
        sort: Option<&str>,
    ) -> StoreResult<Vec<E>> {
        let desc = E::descriptor();
        let order = match sort {
            None => "id DESC".to_string(),
            Some(sort) => translate::render_sort(desc.filterable, sort)?,
        };
        let limit = limit.clamp(1, self.max_page_size);
        let sql = format!(
            "SELECT {} FROM {} WHERE deleted_at IS NULL AND id < $1 ORDER BY {} LIMIT $2",
            desc.columns.join(", "),
            desc.table,
            order,
        );
        let conn = self.client().await?;
        let rows = conn
            .query(&sql, &[&(last_id as i64), &(limit as i64)])
            .await
            .map_err(map_db_err)?;
        rows.iter().map(E::from_row).collect()
    }

    async fn insert(&self, entity: &mut E) -> StoreResult<()> {
        self.stamp_new(entity);
        let (sql, params) = Self::build_insert(entity);
        let refs = SqlParam::as_refs(&params);
        let conn = self.client().await?;
        let row = conn.query_one(&sql, &refs[..]).await.map_err(map_db_err)?;
        let id: i64 = row
            .try_get(0)
            .map_err(|e| StoreError::backend(format!("bad RETURNING id: {e}")))?;
        entity.meta_mut().id = id as EntityId;
        Ok(())
    }

    async fn update(&self, id: EntityId, patch: &Patch) -> StoreResult<u64> {
        let (sql, params) = self.build_update(id, patch)?;
        let refs = SqlParam::as_refs(&params);
        let conn = self.client().await?;
        conn.execute(&sql, &refs[..]).await.map_err(map_db_err)
    }

    async fn soft_delete(&self, ids: &[EntityId]) -> StoreResult<u64> {
        let (sql, params) = self.build_soft_delete(ids);
        let refs = SqlParam::as_refs(&params);
        let conn = self.client().await?;
        conn.execute(&sql, &refs[..]).await.map_err(map_db_err)
    }
}

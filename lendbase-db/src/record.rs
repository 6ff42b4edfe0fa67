//! The per-entity persistence contract
//!
//! A `Record` ties an entity struct to its descriptor, its row mapping and
//! its insert shape. Everything else (caching, translation, the
//! repository protocol) is generic over this trait; adding an entity kind
//! means one struct, one descriptor and one `Record` impl.

use lendbase_core::{Descriptor, EntityId, Meta, StoreError, StoreResult, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_postgres::Row;

use crate::param::SqlParam;

/// A persistable entity kind.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The static metadata bundle for this kind.
    fn descriptor() -> &'static Descriptor;

    /// Shared row metadata (identity and timestamps).
    fn meta(&self) -> &Meta;

    /// Mutable row metadata; the backend writes the assigned identity and
    /// timestamps back through this.
    fn meta_mut(&mut self) -> &mut Meta;

    /// Map one result row onto the entity. The row carries the columns of
    /// `descriptor().columns` in declaration order.
    fn from_row(row: &Row) -> StoreResult<Self>;

    /// Columns given to INSERT, excluding `id` and `deleted_at`. Must
    /// include `created_at` and `updated_at`.
    fn insert_columns() -> &'static [&'static str];

    /// Values matching `insert_columns`, in the same order.
    fn insert_values(&self) -> Vec<SqlParam>;

    /// The entity's identity.
    fn id(&self) -> EntityId {
        self.meta().id
    }

    /// Cache key for this entity.
    fn cache_key_of(id: EntityId) -> String {
        Self::descriptor().cache_key(id)
    }
}

/// Read one column, mapping driver errors to the taxonomy.
pub fn col<'a, T: tokio_postgres::types::FromSql<'a>>(
    row: &'a Row,
    name: &str,
) -> StoreResult<T> {
    row.try_get(name)
        .map_err(|e| StoreError::backend(format!("bad column '{name}': {e}")))
}

/// Read the shared metadata columns from a row.
pub fn meta_from_row(row: &Row) -> StoreResult<Meta> {
    let id: i64 = col(row, "id")?;
    let created_at: Timestamp = col(row, "created_at")?;
    let updated_at: Timestamp = col(row, "updated_at")?;
    let deleted_at: Option<Timestamp> = col(row, "deleted_at")?;
    Ok(Meta {
        id: id as EntityId,
        created_at,
        updated_at,
        deleted_at,
    })
}

/// Read a BIGINT column as an entity identity.
pub fn id_col(row: &Row, name: &str) -> StoreResult<EntityId> {
    let raw: i64 = col(row, name)?;
    Ok(raw as EntityId)
}

/// Read a nullable BIGINT column as an optional entity identity.
pub fn opt_id_col(row: &Row, name: &str) -> StoreResult<Option<EntityId>> {
    let raw: Option<i64> = col(row, name)?;
    Ok(raw.map(|v| v as EntityId))
}

//! Declared join views
//!
//! Cross-table reads go through static `ViewDef`s: a fixed projection
//! over a fixed join graph, filtered and sorted through the same
//! whitelist rules as single-table queries. Callers supply predicates,
//! never SQL fragments, so a view cannot be steered outside its declared
//! shape. Views are plain reads: they never consult or populate the
//! identity cache.

use deadpool_postgres::Pool;
use lendbase_core::{Predicate, StoreError, StoreResult};
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;

use crate::param::SqlParam;
use crate::repo::PageResult;
use crate::translate;

/// A declared join view: projection, join graph and filter whitelist are
/// all static.
#[derive(Debug)]
pub struct ViewDef {
    pub name: &'static str,
    /// SELECT list items, aliased where the row mapper expects it.
    pub projection: &'static [&'static str],
    /// The FROM clause including joins.
    pub from: &'static str,
    /// Filterable and sortable columns, table-qualified.
    pub filterable: &'static [&'static str],
    /// Live-row restriction across the joined tables.
    pub live_filter: &'static str,
    /// ORDER BY applied when the predicate carries no sort.
    pub default_order: &'static str,
    pub max_or_depth: u8,
}

/// A row shape produced by a declared view.
pub trait ViewRecord: Sized + Send {
    fn view() -> &'static ViewDef;
    fn from_row(row: &Row) -> StoreResult<Self>;
}

/// Translate a predicate against a view definition. Same rules as the
/// single-table translator; the live restriction comes from the view.
pub fn translate_view(
    view: &ViewDef,
    pred: &Predicate,
    max_page_size: u64,
) -> StoreResult<translate::Translated> {
    let (limit, offset) = translate::clamp_page(pred.page_index, pred.page_size, max_page_size);
    let order = match pred.sort.as_deref() {
        None => view.default_order.to_string(),
        Some(_) if pred.skips_count() => view.default_order.to_string(),
        Some(sort) => translate::render_sort(view.filterable, sort)?,
    };

    let mut select_params = Vec::new();
    let where_clause = translate::render_where_from(
        view.live_filter,
        view.filterable,
        view.max_or_depth,
        pred,
        &mut select_params,
    )?;
    let mut select_sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        view.projection.join(", "),
        view.from,
        where_clause,
        order,
    );
    select_params.push(SqlParam::Long(limit as i64));
    select_sql.push_str(&format!(" LIMIT ${}", select_params.len()));
    select_params.push(SqlParam::Long(offset as i64));
    select_sql.push_str(&format!(" OFFSET ${}", select_params.len()));

    let count = if pred.skips_count() {
        None
    } else {
        let mut count_params = Vec::new();
        let count_where = translate::render_where_from(
            view.live_filter,
            view.filterable,
            view.max_or_depth,
            pred,
            &mut count_params,
        )?;
        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {}", view.from, count_where);
        Some((count_sql, count_params))
    };

    Ok(translate::Translated {
        select_sql,
        select_params,
        count,
    })
}

/// View query executor over the shared pool.
pub struct PgViews {
    pool: Pool,
    max_page_size: u64,
}

impl PgViews {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            max_page_size: 500,
        }
    }

    /// Set the page size cap.
    pub fn with_max_page_size(mut self, cap: u64) -> Self {
        self.max_page_size = cap;
        self
    }

    /// Run a paginated view query. The count runs first unless the
    /// predicate carries the count-suppression sentinel, and an empty
    /// match short-circuits the page select.
    pub async fn query<V: ViewRecord>(&self, pred: &Predicate) -> StoreResult<PageResult<V>> {
        let translated = translate_view(V::view(), pred, self.max_page_size)?;
        let conn = self.pool.get().await.map_err(|e| {
            tracing::error!("connection pool error: {e:?}");
            StoreError::backend("failed to acquire database connection")
        })?;

        let total = match &translated.count {
            None => 0,
            Some((count_sql, count_params)) => {
                let refs = SqlParam::as_refs(count_params);
                let row = conn
                    .query_one(count_sql, &refs[..])
                    .await
                    .map_err(map_view_err)?;
                let total: i64 = row
                    .try_get(0)
                    .map_err(|e| StoreError::backend(format!("bad count: {e}")))?;
                if total == 0 {
                    return Ok(PageResult {
                        total: 0,
                        records: Vec::new(),
                    });
                }
                total as u64
            }
        };

        let refs = SqlParam::as_refs(&translated.select_params);
        let rows = conn
            .query(&translated.select_sql, &refs[..])
            .await
            .map_err(map_view_err)?;
        let records = rows
            .iter()
            .map(V::from_row)
            .collect::<StoreResult<Vec<V>>>()?;
        Ok(PageResult { total, records })
    }
}

fn map_view_err(e: tokio_postgres::Error) -> StoreError {
    if let Some(state) = e.code() {
        if *state == SqlState::UNIQUE_VIOLATION {
            return StoreError::conflict(e.to_string());
        }
    }
    tracing::error!("view query error: {e:?}");
    StoreError::backend("view query failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendbase_core::CompareOp;

    static OVERVIEW: ViewDef = ViewDef {
        name: "disbursement_overview",
        projection: &[
            "d.id AS id",
            "d.amount_cents AS amount_cents",
            "d.status AS status",
            "b.applicant_name AS applicant_name",
            "c.name AS channel_name",
        ],
        from: "disbursement d \
               JOIN loan_base_info b ON b.id = d.base_info_id \
               JOIN payout_channel c ON c.id = d.payout_channel_id",
        filterable: &["d.id", "d.status", "b.applicant_name", "c.code"],
        live_filter: "d.deleted_at IS NULL AND b.deleted_at IS NULL AND c.deleted_at IS NULL",
        default_order: "d.id DESC",
        max_or_depth: 1,
    };

    #[test]
    fn test_view_translation_uses_declared_shape() {
        let pred = Predicate::new().and_eq("d.status", 2i64);
        let t = translate_view(&OVERVIEW, &pred, 500).unwrap();
        assert!(t.select_sql.starts_with("SELECT d.id AS id,"));
        assert!(t.select_sql.contains("JOIN loan_base_info b"));
        assert!(t
            .select_sql
            .contains("WHERE d.deleted_at IS NULL AND b.deleted_at IS NULL AND c.deleted_at IS NULL AND d.status = $1"));
        assert!(t.select_sql.contains("ORDER BY d.id DESC"));
        let (count_sql, _) = t.count.unwrap();
        assert!(count_sql.starts_with("SELECT COUNT(*) FROM disbursement d"));
    }

    #[test]
    fn test_view_rejects_columns_outside_its_whitelist() {
        // An unqualified or unlisted column cannot slip through.
        for column in ["status", "b.id_card_no", "pg_sleep(1)", "d.status;--"] {
            let pred = Predicate::new().and(column, CompareOp::Eq, 1i64);
            assert!(matches!(
                translate_view(&OVERVIEW, &pred, 500),
                Err(StoreError::InvalidQuery { .. })
            ));
        }
    }

    #[test]
    fn test_view_sort_is_validated_against_the_whitelist() {
        let pred = Predicate::new().sorted_by("b.applicant_name asc, d.id desc");
        let t = translate_view(&OVERVIEW, &pred, 500).unwrap();
        assert!(t
            .select_sql
            .contains("ORDER BY b.applicant_name ASC, d.id DESC"));

        let bad = Predicate::new().sorted_by("b.applicant_name; DROP TABLE users");
        assert!(translate_view(&OVERVIEW, &bad, 500).is_err());
    }

    #[test]
    fn test_view_honors_count_suppression_sentinel() {
        let pred = Predicate::new().ignore_count();
        let t = translate_view(&OVERVIEW, &pred, 500).unwrap();
        assert!(t.count.is_none());
        assert!(t.select_sql.contains("ORDER BY d.id DESC"));
    }
}

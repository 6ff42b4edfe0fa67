//! Query translation from structured predicates to parameterised SQL
//!
//! The translator is a closed, data-driven mapper with no I/O. Every
//! column referenced by a predicate, filter and sort alike, is validated
//! against the whitelist before any SQL is assembled, and every value is
//! emitted as a numbered parameter. Nothing downstream re-validates;
//! this module is the trust boundary.

use lendbase_core::{CompareOp, Cond, Descriptor, Predicate, SqlValue, StoreError, StoreResult};

use crate::param::SqlParam;

/// Page size applied when a predicate leaves `page_size` at zero.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// A fully translated paginated select.
#[derive(Debug)]
pub struct Translated {
    /// The page select, with ORDER BY / LIMIT / OFFSET.
    pub select_sql: String,
    pub select_params: Vec<SqlParam>,
    /// The matching count query; `None` when the predicate carries the
    /// count-suppression sentinel.
    pub count: Option<(String, Vec<SqlParam>)>,
}

/// Translate a predicate against an entity descriptor.
///
/// `max_page_size` caps the requested page size; offset is
/// `page_index * page_size`. The WHERE clause always restricts to live
/// rows (`deleted_at IS NULL`).
pub fn translate(
    desc: &Descriptor,
    pred: &Predicate,
    max_page_size: u64,
) -> StoreResult<Translated> {
    let (limit, offset) = clamp_page(pred.page_index, pred.page_size, max_page_size);
    let order = match pred.sort.as_deref() {
        None => "id DESC".to_string(),
        Some(_) if pred.skips_count() => "id DESC".to_string(),
        Some(sort) => render_sort(desc.filterable, sort)?,
    };

    let mut select_params = Vec::new();
    let where_clause = render_where(desc.filterable, desc.max_or_depth, pred, &mut select_params)?;

    let mut select_sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        desc.columns.join(", "),
        desc.table,
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
        let count_where = render_where(desc.filterable, desc.max_or_depth, pred, &mut count_params)?;
        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            desc.table, count_where
        );
        Some((count_sql, count_params))
    };

    Ok(Translated {
        select_sql,
        select_params,
        count,
    })
}

/// Translate a predicate into a single-row lookup (`LIMIT 1`, no count).
pub fn translate_first(desc: &Descriptor, pred: &Predicate) -> StoreResult<(String, Vec<SqlParam>)> {
    let mut params = Vec::new();
    let where_clause = render_where(desc.filterable, desc.max_or_depth, pred, &mut params)?;
    let order = match pred.sort.as_deref() {
        None => "id DESC".to_string(),
        Some(_) if pred.skips_count() => "id DESC".to_string(),
        Some(sort) => render_sort(desc.filterable, sort)?,
    };
    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT 1",
        desc.columns.join(", "),
        desc.table,
        where_clause,
        order,
    );
    Ok((sql, params))
}

/// Validate a predicate without keeping the generated SQL.
///
/// The repository runs this before consulting the backend so that a
/// whitelist violation never reaches it.
pub fn validate(desc: &Descriptor, pred: &Predicate, max_page_size: u64) -> StoreResult<()> {
    translate(desc, pred, max_page_size).map(|_| ())
}

/// Clamp paging to `[1, cap]`; a zero page size means "unset" and takes
/// the default.
pub fn clamp_page(page_index: u64, page_size: u64, cap: u64) -> (u64, u64) {
    let size = match page_size {
        0 => DEFAULT_PAGE_SIZE.min(cap.max(1)),
        n => n.min(cap.max(1)),
    };
    (size, page_index.saturating_mul(size))
}

/// Render the WHERE clause for a predicate: the live-row restriction plus
/// the AND-joined condition tree. Parameters are appended to `params`;
/// placeholders continue from its current length.
pub fn render_where(
    filterable: &[&str],
    max_or_depth: u8,
    pred: &Predicate,
    params: &mut Vec<SqlParam>,
) -> StoreResult<String> {
    render_where_from(
        "deleted_at IS NULL",
        filterable,
        max_or_depth,
        pred,
        params,
    )
}

/// Like [`render_where`], with a caller-supplied base restriction (used
/// by join views, whose live-row filter names multiple tables).
pub fn render_where_from(
    base: &str,
    filterable: &[&str],
    max_or_depth: u8,
    pred: &Predicate,
    params: &mut Vec<SqlParam>,
) -> StoreResult<String> {
    if pred.or_depth() > max_or_depth {
        return Err(StoreError::invalid_query(format!(
            "OR nesting depth {} exceeds the allowed {}",
            pred.or_depth(),
            max_or_depth
        )));
    }

    let mut clause = base.to_string();
    for cond in &pred.conds {
        clause.push_str(" AND ");
        clause.push_str(&render_cond(filterable, cond, params)?);
    }
    Ok(clause)
}

fn render_cond(
    filterable: &[&str],
    cond: &Cond,
    params: &mut Vec<SqlParam>,
) -> StoreResult<String> {
    match cond {
        Cond::Cmp(filter) => {
            if !filterable.contains(&filter.column.as_str()) {
                return Err(StoreError::column_not_allowed(&filter.column));
            }
            render_comparison(&filter.column, filter.op, &filter.value, params)
        }
        Cond::Any(group) => {
            if group.is_empty() {
                return Err(StoreError::invalid_query("empty OR group"));
            }
            let rendered: Vec<String> = group
                .iter()
                .map(|inner| render_cond(filterable, inner, params))
                .collect::<StoreResult<_>>()?;
            Ok(format!("({})", rendered.join(" OR ")))
        }
    }
}

fn render_comparison(
    column: &str,
    op: CompareOp,
    value: &SqlValue,
    params: &mut Vec<SqlParam>,
) -> StoreResult<String> {
    let sql_op = match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "!=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::Like => "LIKE",
        CompareOp::IsNull => return Ok(format!("{column} IS NULL")),
        CompareOp::IsNotNull => return Ok(format!("{column} IS NOT NULL")),
        CompareOp::In => {
            match value {
                SqlValue::IntList(list) if list.is_empty() => {
                    return Err(StoreError::invalid_query("empty IN list"));
                }
                SqlValue::TextList(list) if list.is_empty() => {
                    return Err(StoreError::invalid_query("empty IN list"));
                }
                SqlValue::IntList(_) | SqlValue::TextList(_) => {}
                other => {
                    return Err(StoreError::invalid_query(format!(
                        "IN requires a list value, got {other:?}"
                    )));
                }
            }
            params.push(SqlParam::try_from(value.clone())?);
            return Ok(format!("{column} = ANY(${})", params.len()));
        }
    };

    params.push(SqlParam::try_from(value.clone())?);
    Ok(format!("{column} {sql_op} ${}", params.len()))
}

/// Parse and validate a sort clause: a comma-separated list of
/// `column [ASC|DESC]` tokens against the whitelist.
pub fn render_sort(filterable: &[&str], sort: &str) -> StoreResult<String> {
    let mut parts = Vec::new();
    for token in sort.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::invalid_argument(format!(
                "unparseable sort clause: '{sort}'"
            )));
        }
        let mut words = token.split_whitespace();
        let column = match words.next() {
            Some(c) => c,
            None => {
                return Err(StoreError::invalid_argument(format!(
                    "unparseable sort clause: '{sort}'"
                )))
            }
        };
        let direction = match words.next() {
            None => "ASC",
            Some(d) if d.eq_ignore_ascii_case("asc") => "ASC",
            Some(d) if d.eq_ignore_ascii_case("desc") => "DESC",
            Some(d) => {
                return Err(StoreError::invalid_argument(format!(
                    "invalid sort direction '{d}'"
                )))
            }
        };
        if words.next().is_some() {
            return Err(StoreError::invalid_argument(format!(
                "unparseable sort clause: '{sort}'"
            )));
        }
        if !filterable.contains(&column) {
            return Err(StoreError::column_not_allowed(column));
        }
        parts.push(format!("{column} {direction}"));
    }
    if parts.is_empty() {
        return Err(StoreError::invalid_argument("empty sort clause"));
    }
    Ok(parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendbase_core::{CompareOp, Filter};
    use proptest::prelude::*;
    use std::time::Duration;

    const DESC: Descriptor = Descriptor {
        kind: "loan_base_info",
        table: "loan_base_info",
        columns: &[
            "id",
            "applicant_name",
            "status",
            "created_at",
            "updated_at",
            "deleted_at",
        ],
        filterable: &["id", "applicant_name", "status", "created_at"],
        updatable: &["applicant_name", "status"],
        cache_ttl: Duration::from_secs(3600),
        max_or_depth: 1,
    };

    #[test]
    fn test_empty_predicate_selects_live_rows() {
        let t = translate(&DESC, &Predicate::new(), 500).unwrap();
        assert!(t.select_sql.contains("WHERE deleted_at IS NULL"));
        assert!(t.select_sql.contains("ORDER BY id DESC"));
        assert!(t.select_sql.ends_with("LIMIT $1 OFFSET $2"));
        assert_eq!(
            t.select_params,
            vec![
                SqlParam::Long(DEFAULT_PAGE_SIZE as i64),
                SqlParam::Long(0)
            ]
        );
        let (count_sql, count_params) = t.count.unwrap();
        assert_eq!(
            count_sql,
            "SELECT COUNT(*) FROM loan_base_info WHERE deleted_at IS NULL"
        );
        assert!(count_params.is_empty());
    }

    #[test]
    fn test_filters_are_parameterised_and_and_joined() {
        let pred = Predicate::new()
            .and_eq("status", 2i64)
            .and("applicant_name", CompareOp::Like, "Zhang%");
        let t = translate(&DESC, &pred, 500).unwrap();

        assert!(t
            .select_sql
            .contains("WHERE deleted_at IS NULL AND status = $1 AND applicant_name LIKE $2"));
        assert_eq!(t.select_params[0], SqlParam::Long(2));
        assert_eq!(t.select_params[1], SqlParam::Text("Zhang%".to_string()));
        // The value itself never appears in the SQL text.
        assert!(!t.select_sql.contains("Zhang"));
    }

    #[test]
    fn test_non_whitelisted_column_is_rejected() {
        let pred = Predicate::new().and_eq("password_hash", "x");
        let err = translate(&DESC, &pred, 500).unwrap_err();
        assert_eq!(err, StoreError::column_not_allowed("password_hash"));
    }

    #[test]
    fn test_in_maps_to_any_with_array_param() {
        let pred = Predicate::new().and_in("id", vec![1, 2, 3]);
        let t = translate(&DESC, &pred, 500).unwrap();
        assert!(t.select_sql.contains("id = ANY($1)"));
        assert_eq!(t.select_params[0], SqlParam::LongList(vec![1, 2, 3]));
    }

    #[test]
    fn test_empty_in_list_is_rejected() {
        let pred = Predicate::new().and_in("id", vec![]);
        assert!(matches!(
            translate(&DESC, &pred, 500),
            Err(StoreError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_or_group_renders_parenthesised() {
        let pred = Predicate::new().and_any(vec![
            Cond::Cmp(Filter::new("status", CompareOp::Eq, 1i64)),
            Cond::Cmp(Filter::new("status", CompareOp::Eq, 2i64)),
        ]);
        let t = translate(&DESC, &pred, 500).unwrap();
        assert!(t.select_sql.contains("(status = $1 OR status = $2)"));
    }

    #[test]
    fn test_or_nesting_beyond_descriptor_depth_is_rejected() {
        let inner = Cond::Any(vec![Cond::Cmp(Filter::new("status", CompareOp::Eq, 1i64))]);
        let pred = Predicate::new().and_any(vec![inner]);
        assert_eq!(pred.or_depth(), 2);
        assert!(matches!(
            translate(&DESC, &pred, 500),
            Err(StoreError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_null_tests_bind_no_parameter() {
        let pred = Predicate::new().and("created_at", CompareOp::IsNotNull, SqlValue::Null);
        let t = translate(&DESC, &pred, 500).unwrap();
        assert!(t.select_sql.contains("created_at IS NOT NULL"));
        // Only LIMIT and OFFSET bind.
        assert_eq!(t.select_params.len(), 2);
    }

    #[test]
    fn test_ignore_count_sentinel_skips_count_query() {
        let pred = Predicate::new().ignore_count();
        let t = translate(&DESC, &pred, 500).unwrap();
        assert!(t.count.is_none());
    }

    #[test]
    fn test_sort_clause_is_validated_and_normalised() {
        let pred = Predicate::new().sorted_by("created_at desc, id");
        let t = translate(&DESC, &pred, 500).unwrap();
        assert!(t.select_sql.contains("ORDER BY created_at DESC, id ASC"));

        let bad = Predicate::new().sorted_by("created_at sideways");
        assert!(matches!(
            translate(&DESC, &bad, 500),
            Err(StoreError::InvalidArgument { .. })
        ));

        let unlisted = Predicate::new().sorted_by("password_hash");
        assert!(matches!(
            translate(&DESC, &unlisted, 500),
            Err(StoreError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_page_clamping() {
        assert_eq!(clamp_page(0, 0, 500), (DEFAULT_PAGE_SIZE, 0));
        assert_eq!(clamp_page(3, 50, 500), (50, 150));
        assert_eq!(clamp_page(2, 9_999, 500), (500, 1000));
        assert_eq!(clamp_page(1, 10, 5), (5, 5));
    }

    #[test]
    fn test_translate_first_limits_to_one_row() {
        let pred = Predicate::new().and_eq("status", 1i64);
        let (sql, params) = translate_first(&DESC, &pred).unwrap();
        assert!(sql.ends_with("LIMIT 1"));
        assert_eq!(params.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_unknown_columns_never_translate(column in "[a-z_]{1,20}") {
            prop_assume!(!DESC.filterable.contains(&column.as_str()));
            let pred = Predicate::new().and_eq(column, 1i64);
            prop_assert!(
                matches!(
                    translate(&DESC, &pred, 500),
                    Err(StoreError::InvalidQuery { .. })
                ),
                "unknown column translated"
            );
        }

        #[test]
        fn prop_text_values_never_leak_into_sql(value in "val_[a-z0-9 '%;-]{8,40}") {
            let pred = Predicate::new().and_eq("applicant_name", value.clone());
            let t = translate(&DESC, &pred, 500).unwrap();
            // Parameterisation: the raw value only ever travels as a param.
            prop_assert!(!t.select_sql.contains(&value));
        }
    }
}

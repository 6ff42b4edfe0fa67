//! Typed SQL parameters for dynamically built statements
//!
//! Dynamic statements (predicate translation, partial updates, inserts)
//! collect their arguments as `SqlParam` values and borrow them as
//! `&(dyn ToSql + Sync)` at execution time. Optional variants carry typed
//! nulls so that a `None` binds with the column's wire type.

use chrono::{DateTime, Utc};
use lendbase_core::{SqlValue, StoreError, StoreResult};

/// A single statement argument.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// 32-bit integer value
    Int(i32),
    /// 64-bit integer value
    Long(i64),
    /// Optional 64-bit integer value
    OptLong(Option<i64>),
    /// Double-precision float value
    Double(f64),
    /// Boolean value
    Bool(bool),
    /// Text value
    Text(String),
    /// Optional text value
    OptText(Option<String>),
    /// Timestamp value
    Timestamp(DateTime<Utc>),
    /// Optional timestamp value
    OptTimestamp(Option<DateTime<Utc>>),
    /// Array of 64-bit integers (for `= ANY($n)`)
    LongList(Vec<i64>),
    /// Array of text values (for `= ANY($n)`)
    TextList(Vec<String>),
}

impl SqlParam {
    /// Convert this parameter to a reference usable with tokio_postgres.
    pub fn as_to_sql(&self) -> &(dyn tokio_postgres::types::ToSql + Sync) {
        match self {
            SqlParam::Int(v) => v,
            SqlParam::Long(v) => v,
            SqlParam::OptLong(v) => v,
            SqlParam::Double(v) => v,
            SqlParam::Bool(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::OptText(v) => v,
            SqlParam::Timestamp(v) => v,
            SqlParam::OptTimestamp(v) => v,
            SqlParam::LongList(v) => v,
            SqlParam::TextList(v) => v,
        }
    }

    /// Borrow a parameter slice the way tokio_postgres expects it.
    pub fn as_refs(params: &[SqlParam]) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
        params.iter().map(|p| p.as_to_sql()).collect()
    }
}

/// Convert a predicate value into a statement argument.
///
/// `SqlValue::Null` is rejected: null tests use the dedicated operators
/// and never bind a parameter, and a comparison against NULL can only
/// yield an empty result the caller did not intend.
impl TryFrom<SqlValue> for SqlParam {
    type Error = StoreError;

    fn try_from(value: SqlValue) -> StoreResult<Self> {
        match value {
            SqlValue::Int(v) => Ok(SqlParam::Long(v)),
            SqlValue::Uint(v) => Ok(SqlParam::Long(v as i64)),
            SqlValue::Float(v) => Ok(SqlParam::Double(v)),
            SqlValue::Bool(v) => Ok(SqlParam::Bool(v)),
            SqlValue::Text(v) => Ok(SqlParam::Text(v)),
            SqlValue::Timestamp(v) => Ok(SqlParam::Timestamp(v)),
            SqlValue::IntList(v) => Ok(SqlParam::LongList(v)),
            SqlValue::TextList(v) => Ok(SqlParam::TextList(v)),
            SqlValue::Null => Err(StoreError::invalid_query(
                "NULL comparison values are not allowed; use the is_null/is_not_null operators",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_binds_as_bigint() {
        assert_eq!(
            SqlParam::try_from(SqlValue::Uint(7)).unwrap(),
            SqlParam::Long(7)
        );
    }

    #[test]
    fn test_null_comparison_value_is_rejected() {
        let err = SqlParam::try_from(SqlValue::Null).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery { .. }));
    }

    #[test]
    fn test_as_refs_preserves_order() {
        let params = vec![SqlParam::Long(1), SqlParam::Text("x".to_string())];
        assert_eq!(SqlParam::as_refs(&params).len(), 2);
    }
}

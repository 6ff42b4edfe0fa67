//! Structured predicates for repository queries
//!
//! A `Predicate` is the only way callers express filters: an ordered list
//! of column comparisons (AND-joined, with optional OR groups), a sort
//! clause and paging. The query translator in `lendbase-db` validates every
//! referenced column against the entity descriptor's whitelist and emits
//! parameterised SQL; nothing here touches the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort sentinel: suppresses the separate count query in a paginated
/// listing. The returned total is `0`; the page itself is still selected.
pub const IGNORE_COUNT: &str = "ignore count";

/// Comparison operator for column filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// In list of values
    In,
    /// SQL LIKE pattern match
    Like,
    /// Column is NULL (value is ignored)
    IsNull,
    /// Column is not NULL (value is ignored)
    IsNotNull,
}

/// A typed filter value, translated to a typed Postgres parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlValue {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(DateTime<Utc>),
    IntList(Vec<i64>),
    TextList(Vec<String>),
    Null,
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

/// A single column comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column to filter on; must be whitelisted by the descriptor.
    pub column: String,
    /// Operator to apply.
    pub op: CompareOp,
    /// Value to compare against; ignored for the null-test operators.
    pub value: SqlValue,
}

impl Filter {
    /// Create a new filter.
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}

/// A condition tree node: a single comparison, or an OR group.
///
/// Top-level conditions are AND-joined; disjunction is expressed by
/// nesting `Any` groups. The descriptor bounds the nesting depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cond {
    Cmp(Filter),
    Any(Vec<Cond>),
}

/// A caller-supplied structured query: filters, paging and sort.
///
/// The empty predicate matches every live entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Predicate {
    /// AND-joined condition list.
    pub conds: Vec<Cond>,
    /// Comma-separated `column [ASC|DESC]` list, or the
    /// [`IGNORE_COUNT`] sentinel. `None` means backend default order.
    pub sort: Option<String>,
    /// Zero-based page index.
    pub page_index: u64,
    /// Requested page size; the translator clamps it to its cap.
    pub page_size: u64,
}

impl Predicate {
    /// Create an empty predicate (matches every live entity).
    pub fn new() -> Self {
        Self::default()
    }

    /// AND a comparison onto the predicate.
    pub fn and(mut self, column: impl Into<String>, op: CompareOp, value: impl Into<SqlValue>) -> Self {
        self.conds.push(Cond::Cmp(Filter::new(column, op, value)));
        self
    }

    /// AND an equality comparison.
    pub fn and_eq(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.and(column, CompareOp::Eq, value)
    }

    /// AND an `IN` comparison over an id list.
    pub fn and_in(mut self, column: impl Into<String>, values: Vec<i64>) -> Self {
        self.conds.push(Cond::Cmp(Filter::new(
            column,
            CompareOp::In,
            SqlValue::IntList(values),
        )));
        self
    }

    /// AND an OR group of conditions.
    pub fn and_any(mut self, group: Vec<Cond>) -> Self {
        self.conds.push(Cond::Any(group));
        self
    }

    /// Set the sort clause.
    pub fn sorted_by(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Opt out of the total-count query for this paginated read.
    pub fn ignore_count(mut self) -> Self {
        self.sort = Some(IGNORE_COUNT.to_string());
        self
    }

    /// Set paging.
    pub fn paged(mut self, page_index: u64, page_size: u64) -> Self {
        self.page_index = page_index;
        self.page_size = page_size;
        self
    }

    /// Whether the sort clause is the count-suppression sentinel.
    pub fn skips_count(&self) -> bool {
        self.sort.as_deref() == Some(IGNORE_COUNT)
    }

    /// Greatest `Any` nesting depth in the condition tree.
    pub fn or_depth(&self) -> u8 {
        fn depth(cond: &Cond) -> u8 {
            match cond {
                Cond::Cmp(_) => 0,
                Cond::Any(group) => 1 + group.iter().map(depth).max().unwrap_or(0),
            }
        }
        self.conds.iter().map(depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_predicate_matches_everything() {
        let pred = Predicate::new();
        assert!(pred.conds.is_empty());
        assert_eq!(pred.or_depth(), 0);
        assert!(!pred.skips_count());
    }

    #[test]
    fn test_builder_composes_filters() {
        let pred = Predicate::new()
            .and_eq("status", 2i64)
            .and("amount", CompareOp::Gte, 1_000i64)
            .paged(3, 50);

        assert_eq!(pred.conds.len(), 2);
        assert_eq!(pred.page_index, 3);
        assert_eq!(pred.page_size, 50);
    }

    #[test]
    fn test_ignore_count_sentinel() {
        let pred = Predicate::new().ignore_count();
        assert!(pred.skips_count());
        assert_eq!(pred.sort.as_deref(), Some(IGNORE_COUNT));
    }

    #[test]
    fn test_or_depth_counts_nesting() {
        let inner = Cond::Any(vec![Cond::Cmp(Filter::new("status", CompareOp::Eq, 1i64))]);
        let pred = Predicate::new().and_any(vec![
            Cond::Cmp(Filter::new("status", CompareOp::Eq, 2i64)),
            inner,
        ]);
        assert_eq!(pred.or_depth(), 2);
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from(5i64), SqlValue::Int(5));
        assert_eq!(SqlValue::from("x"), SqlValue::Text("x".to_string()));
        assert_eq!(SqlValue::from(true), SqlValue::Bool(true));
    }
}

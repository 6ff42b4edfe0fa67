//! Explicit partial updates
//!
//! A `Patch` names exactly the columns an update touches. Presence in the
//! patch, not a zero-value heuristic, is what includes a column, so
//! legitimate zero values (a 0 status code, a 0.0 fee rate, `false`) are
//! updatable like any other. Per-entity typed patch structs build a
//! `Patch` from their `Option` fields (`Some` means update).

use lendbase_core::{SqlValue, StoreError, StoreResult};

/// An ordered set of `(column, value)` assignments for a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    sets: Vec<(String, SqlValue)>,
}

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a column. Re-assigning a column replaces its value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let column = column.into();
        let value = value.into();
        if let Some(existing) = self.sets.iter_mut().find(|(c, _)| *c == column) {
            existing.1 = value;
        } else {
            self.sets.push((column, value));
        }
        self
    }

    /// Assign a column to SQL NULL.
    pub fn set_null(self, column: impl Into<String>) -> Self {
        self.set(column, SqlValue::Null)
    }

    /// Whether the patch assigns no columns.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// The assigned columns, in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|(c, _)| c.as_str())
    }

    /// The assignments, in insertion order.
    pub fn entries(&self) -> &[(String, SqlValue)] {
        &self.sets
    }

    /// Validate this patch against an updatable-column set.
    ///
    /// An empty patch is `InvalidArgument`; a column outside the set is
    /// `InvalidQuery`.
    pub fn validate(&self, updatable: &[&str]) -> StoreResult<()> {
        if self.is_empty() {
            return Err(StoreError::invalid_argument("empty update patch"));
        }
        for column in self.columns() {
            if !updatable.contains(&column) {
                return Err(StoreError::invalid_query(format!(
                    "column '{column}' is not updatable"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_preserves_insertion_order() {
        let patch = Patch::new().set("status", 2i64).set("fee_rate", 0.0f64);
        let columns: Vec<&str> = patch.columns().collect();
        assert_eq!(columns, vec!["status", "fee_rate"]);
    }

    #[test]
    fn test_reassignment_replaces_value() {
        let patch = Patch::new().set("status", 1i64).set("status", 2i64);
        assert_eq!(patch.entries(), &[("status".to_string(), SqlValue::Int(2))]);
    }

    #[test]
    fn test_zero_values_participate() {
        // The whole point of the explicit patch: 0 and 0.0 and false are
        // ordinary values, not "skip this column" markers.
        let patch = Patch::new()
            .set("status", 0i64)
            .set("fee_rate", 0.0f64)
            .set("enabled", false);
        assert_eq!(patch.entries().len(), 3);
        patch.validate(&["status", "fee_rate", "enabled"]).unwrap();
    }

    #[test]
    fn test_empty_patch_is_invalid_argument() {
        assert!(matches!(
            Patch::new().validate(&["status"]),
            Err(StoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_non_updatable_column_is_invalid_query() {
        let patch = Patch::new().set("id", 9i64);
        assert!(matches!(
            patch.validate(&["status"]),
            Err(StoreError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_set_null() {
        let patch = Patch::new().set_null("disbursed_at");
        assert_eq!(
            patch.entries(),
            &[("disbursed_at".to_string(), SqlValue::Null)]
        );
    }
}

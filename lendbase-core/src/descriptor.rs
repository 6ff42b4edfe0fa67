//! Per-kind static metadata
//!
//! Every entity kind carries one static `Descriptor`: the backing table,
//! the column whitelist that bounds externally supplied predicates, the
//! set of columns eligible for partial update, and the cache TTL. The
//! whitelist is the trust boundary; nothing downstream re-validates.

use std::time::Duration;

/// Static metadata bundle for one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    /// Kind tag; also the cache key prefix (`kind:id`).
    pub kind: &'static str,
    /// Backing table name.
    pub table: &'static str,
    /// Select projection, in declaration order. Always includes the four
    /// meta columns `id`, `created_at`, `updated_at`, `deleted_at`.
    pub columns: &'static [&'static str],
    /// Columns safe to appear in externally supplied predicates.
    pub filterable: &'static [&'static str],
    /// Columns eligible for partial update.
    pub updatable: &'static [&'static str],
    /// Positive cache TTL for this kind.
    pub cache_ttl: Duration,
    /// Maximum `Any` (OR group) nesting depth a predicate may use.
    pub max_or_depth: u8,
}

impl Descriptor {
    /// Whether `column` may appear in an external predicate.
    pub fn is_filterable(&self, column: &str) -> bool {
        self.filterable.contains(&column)
    }

    /// Whether `column` may participate in a partial update.
    pub fn is_updatable(&self, column: &str) -> bool {
        self.updatable.contains(&column)
    }

    /// Cache key for one identity of this kind.
    pub fn cache_key(&self, id: u64) -> String {
        format!("{}:{}", self.kind, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: Descriptor = Descriptor {
        kind: "widget",
        table: "widgets",
        columns: &["id", "name", "created_at", "updated_at", "deleted_at"],
        filterable: &["id", "name", "created_at"],
        updatable: &["name"],
        cache_ttl: Duration::from_secs(3600),
        max_or_depth: 1,
    };

    #[test]
    fn test_whitelist_membership() {
        assert!(DESC.is_filterable("name"));
        assert!(!DESC.is_filterable("password_hash"));
        assert!(DESC.is_updatable("name"));
        assert!(!DESC.is_updatable("id"));
    }

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(DESC.cache_key(7), "widget:7");
    }
}

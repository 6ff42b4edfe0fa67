//! Identity types and row metadata for Lendbase entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity identifier. Assigned by the backend on first persistence
/// (BIGSERIAL) and never reused.
pub type EntityId = u64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// The reserved "unset" identity. No operation accepts `0` as a target;
/// a freshly constructed entity carries it until the backend assigns one.
pub const UNSET_ID: EntityId = 0;

/// Row metadata shared by every entity table.
///
/// Every table carries `id`, `created_at`, `updated_at` and a nullable
/// `deleted_at`. A row is **live** iff `deleted_at` is unset; soft-deleted
/// rows are invisible to all read paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Backend-assigned identity; `UNSET_ID` before first persistence.
    pub id: EntityId,
    /// Immutable after assignment.
    pub created_at: Timestamp,
    /// Advances monotonically per entity.
    pub updated_at: Timestamp,
    /// Soft-delete stamp; `None` means live.
    pub deleted_at: Option<Timestamp>,
}

impl Meta {
    /// Metadata for a not-yet-persisted entity.
    pub fn unsaved(now: Timestamp) -> Self {
        Self {
            id: UNSET_ID,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether this row is live (not soft-deleted).
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsaved_meta_is_live_and_unset() {
        let meta = Meta::unsaved(Utc::now());
        assert_eq!(meta.id, UNSET_ID);
        assert!(meta.is_live());
        assert_eq!(meta.created_at, meta.updated_at);
    }

    #[test]
    fn test_deleted_meta_is_not_live() {
        let mut meta = Meta::unsaved(Utc::now());
        meta.deleted_at = Some(Utc::now());
        assert!(!meta.is_live());
    }
}

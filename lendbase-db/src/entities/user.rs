//! Back-office user.
//!
//! The `password_hash` column is stored and updatable but deliberately
//! absent from the filterable set: a predicate can never probe it.

use std::time::Duration;

use lendbase_core::{Descriptor, EntityId, Meta, StoreResult};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::param::SqlParam;
use crate::patch::Patch;
use crate::record::{col, id_col, meta_from_row, Record};
use crate::view::{ViewDef, ViewRecord};

static DESCRIPTOR: Descriptor = Descriptor {
    kind: "user",
    table: "app_user",
    columns: &[
        "id",
        "username",
        "display_name",
        "password_hash",
        "status",
        "created_at",
        "updated_at",
        "deleted_at",
    ],
    filterable: &["id", "username", "display_name", "status", "created_at"],
    updatable: &["display_name", "password_hash", "status"],
    cache_ttl: Duration::from_secs(3600),
    max_or_depth: 1,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub meta: Meta,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub status: i32,
}

impl Record for User {
    fn descriptor() -> &'static Descriptor {
        &DESCRIPTOR
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            meta: meta_from_row(row)?,
            username: col(row, "username")?,
            display_name: col(row, "display_name")?,
            password_hash: col(row, "password_hash")?,
            status: col(row, "status")?,
        })
    }

    fn insert_columns() -> &'static [&'static str] {
        &[
            "username",
            "display_name",
            "password_hash",
            "status",
            "created_at",
            "updated_at",
        ]
    }

    fn insert_values(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Text(self.username.clone()),
            SqlParam::Text(self.display_name.clone()),
            SqlParam::Text(self.password_hash.clone()),
            SqlParam::Int(self.status),
            SqlParam::Timestamp(self.meta.created_at),
            SqlParam::Timestamp(self.meta.updated_at),
        ]
    }
}

/// Typed partial update; `Some` means update.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub status: Option<i32>,
}

impl UserPatch {
    pub fn into_patch(self) -> Patch {
        let mut patch = Patch::new();
        if let Some(v) = self.display_name {
            patch = patch.set("display_name", v);
        }
        if let Some(v) = self.password_hash {
            patch = patch.set("password_hash", v);
        }
        if let Some(v) = self.status {
            patch = patch.set("status", v as i64);
        }
        patch
    }
}

/// Identity-and-name projection of a user, safe to embed in other
/// entities' expansions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBrief {
    pub id: EntityId,
    pub username: String,
    pub display_name: String,
}

impl From<&User> for UserBrief {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

/// Join view resolving each user's role assignments to role codes.
static ROLE_VIEW: ViewDef = ViewDef {
    name: "user_role_view",
    projection: &[
        "u.id AS user_id",
        "u.username AS username",
        "u.display_name AS display_name",
        "r.code AS role_code",
        "r.name AS role_name",
    ],
    from: "app_user u \
           JOIN user_role ur ON ur.user_id = u.id \
           JOIN role r ON r.id = ur.role_id",
    filterable: &["u.id", "u.username", "u.status", "r.code"],
    live_filter: "u.deleted_at IS NULL AND r.deleted_at IS NULL",
    default_order: "u.id DESC",
    max_or_depth: 1,
};

/// One (user, role) assignment row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoleRow {
    pub user_id: EntityId,
    pub username: String,
    pub display_name: String,
    pub role_code: String,
    pub role_name: String,
}

impl ViewRecord for UserRoleRow {
    fn view() -> &'static ViewDef {
        &ROLE_VIEW
    }

    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            user_id: id_col(row, "user_id")?,
            username: col(row, "username")?,
            display_name: col(row, "display_name")?,
            role_code: col(row, "role_code")?,
            role_name: col(row, "role_name")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate;
    use crate::view::translate_view;
    use lendbase_core::Predicate;

    #[test]
    fn test_password_hash_cannot_be_filtered() {
        assert!(!DESCRIPTOR.filterable.contains(&"password_hash"));
        let pred = Predicate::new().and_eq("password_hash", "$2b$12$abc");
        assert!(translate::translate(&DESCRIPTOR, &pred, 500).is_err());
    }

    #[test]
    fn test_password_hash_is_still_updatable() {
        let patch = UserPatch {
            password_hash: Some("$2b$12$new".into()),
            ..Default::default()
        }
        .into_patch();
        assert!(patch.validate(DESCRIPTOR.updatable).is_ok());
    }

    #[test]
    fn test_role_view_filters_by_role_code() {
        let pred = Predicate::new().and_eq("r.code", "RISK_ADMIN");
        let t = translate_view(&ROLE_VIEW, &pred, 500).unwrap();
        assert!(t.select_sql.contains("r.code = $1"));
        assert!(t.select_sql.contains("JOIN user_role ur"));
    }
}

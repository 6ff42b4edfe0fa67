//! Risk customer: a flagged applicant with the flagging user on record.

use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;

use lendbase_core::{Descriptor, EntityId, Meta, StoreResult};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::backend::Backend;
use crate::param::SqlParam;
use crate::patch::Patch;
use crate::record::{col, id_col, meta_from_row, Record};
use crate::repo::Repository;

use super::base_info::LoanBaseInfo;
use super::user::{User, UserBrief};

static DESCRIPTOR: Descriptor = Descriptor {
    kind: "risk_customer",
    table: "risk_customer",
    columns: &[
        "id",
        "base_info_id",
        "risk_level",
        "reason",
        "author_user_id",
        "created_at",
        "updated_at",
        "deleted_at",
    ],
    filterable: &[
        "id",
        "base_info_id",
        "risk_level",
        "author_user_id",
        "created_at",
    ],
    updatable: &["risk_level", "reason"],
    cache_ttl: Duration::from_secs(1800),
    max_or_depth: 1,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCustomer {
    pub meta: Meta,
    pub base_info_id: EntityId,
    pub risk_level: i32,
    pub reason: String,
    pub author_user_id: EntityId,
}

impl Record for RiskCustomer {
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
            base_info_id: id_col(row, "base_info_id")?,
            risk_level: col(row, "risk_level")?,
            reason: col(row, "reason")?,
            author_user_id: id_col(row, "author_user_id")?,
        })
    }

    fn insert_columns() -> &'static [&'static str] {
        &[
            "base_info_id",
            "risk_level",
            "reason",
            "author_user_id",
            "created_at",
            "updated_at",
        ]
    }

    fn insert_values(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Long(self.base_info_id as i64),
            SqlParam::Int(self.risk_level),
            SqlParam::Text(self.reason.clone()),
            SqlParam::Long(self.author_user_id as i64),
            SqlParam::Timestamp(self.meta.created_at),
            SqlParam::Timestamp(self.meta.updated_at),
        ]
    }
}

/// Typed partial update; `Some` means update.
#[derive(Debug, Clone, Default)]
pub struct RiskCustomerPatch {
    pub risk_level: Option<i32>,
    pub reason: Option<String>,
}

impl RiskCustomerPatch {
    pub fn into_patch(self) -> Patch {
        let mut patch = Patch::new();
        if let Some(v) = self.risk_level {
            patch = patch.set("risk_level", v as i64);
        }
        if let Some(v) = self.reason {
            patch = patch.set("reason", v);
        }
        patch
    }
}

/// A risk customer with its referenced base info and flagging user
/// resolved. Either reference may be missing (soft-deleted meanwhile).
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCustomerExpanded {
    pub risk: RiskCustomer,
    pub base_info: Option<LoanBaseInfo>,
    pub author: Option<UserBrief>,
}

impl RiskCustomerExpanded {
    /// Resolve the references for a page of risk customers: the distinct
    /// base-info and author ids each go through one batch read (cache
    /// fan-in included), then rows are reassembled in input order.
    pub async fn load<B1, B2>(
        risks: Vec<RiskCustomer>,
        base_infos: &Repository<LoanBaseInfo, B1>,
        users: &Repository<User, B2>,
    ) -> StoreResult<Vec<Self>>
    where
        B1: Backend<LoanBaseInfo>,
        B2: Backend<User>,
    {
        let base_ids = distinct_ids(risks.iter().map(|r| r.base_info_id));
        let author_ids = distinct_ids(risks.iter().map(|r| r.author_user_id));

        let base_map = if base_ids.is_empty() {
            HashMap::new()
        } else {
            base_infos.get_by_ids(&base_ids).await?
        };
        let user_map = if author_ids.is_empty() {
            HashMap::new()
        } else {
            users.get_by_ids(&author_ids).await?
        };

        Ok(assemble(risks, &base_map, &user_map))
    }
}

fn distinct_ids(ids: impl Iterator<Item = EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.filter(|&id| id != 0 && seen.insert(id)).collect()
}

fn assemble(
    risks: Vec<RiskCustomer>,
    base_map: &HashMap<EntityId, LoanBaseInfo>,
    user_map: &HashMap<EntityId, User>,
) -> Vec<RiskCustomerExpanded> {
    risks
        .into_iter()
        .map(|risk| {
            let base_info = base_map.get(&risk.base_info_id).cloned();
            let author = user_map.get(&risk.author_user_id).map(UserBrief::from);
            RiskCustomerExpanded {
                risk,
                base_info,
                author,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn risk(id: EntityId, base_info_id: EntityId, author_user_id: EntityId) -> RiskCustomer {
        let mut meta = Meta::unsaved(Utc::now());
        meta.id = id;
        RiskCustomer {
            meta,
            base_info_id,
            risk_level: 2,
            reason: "blacklisted id card".into(),
            author_user_id,
        }
    }

    #[test]
    fn test_distinct_ids_drop_duplicates_and_zeroes() {
        let risks = vec![risk(1, 10, 100), risk(2, 10, 101), risk(3, 0, 100)];
        assert_eq!(distinct_ids(risks.iter().map(|r| r.base_info_id)), vec![10]);
        assert_eq!(
            distinct_ids(risks.iter().map(|r| r.author_user_id)),
            vec![100, 101]
        );
    }

    #[test]
    fn test_assemble_tolerates_missing_references() {
        let risks = vec![risk(1, 10, 100), risk(2, 11, 100)];
        let base_map = HashMap::new();
        let user_map = HashMap::new();
        let expanded = assemble(risks, &base_map, &user_map);
        assert_eq!(expanded.len(), 2);
        assert!(expanded[0].base_info.is_none());
        assert!(expanded[0].author.is_none());
        assert_eq!(expanded[1].risk.id(), 2);
    }
}

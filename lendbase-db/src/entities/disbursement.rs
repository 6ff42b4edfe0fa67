//! Disbursement: one payout of an approved loan through a channel.

use std::time::Duration;

use lendbase_core::{Descriptor, EntityId, Meta, StoreResult, Timestamp};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::param::SqlParam;
use crate::patch::Patch;
use crate::record::{col, id_col, meta_from_row, Record};
use crate::view::{ViewDef, ViewRecord};

static DESCRIPTOR: Descriptor = Descriptor {
    kind: "disbursement",
    table: "disbursement",
    columns: &[
        "id",
        "base_info_id",
        "payout_channel_id",
        "amount_cents",
        "status",
        "disbursed_at",
        "created_at",
        "updated_at",
        "deleted_at",
    ],
    filterable: &[
        "id",
        "base_info_id",
        "payout_channel_id",
        "status",
        "disbursed_at",
        "created_at",
    ],
    updatable: &["payout_channel_id", "amount_cents", "status", "disbursed_at"],
    cache_ttl: Duration::from_secs(1800),
    max_or_depth: 1,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disbursement {
    pub meta: Meta,
    pub base_info_id: EntityId,
    pub payout_channel_id: EntityId,
    pub amount_cents: i64,
    pub status: i32,
    /// Set once the payout actually went out.
    pub disbursed_at: Option<Timestamp>,
}

impl Record for Disbursement {
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
            payout_channel_id: id_col(row, "payout_channel_id")?,
            amount_cents: col(row, "amount_cents")?,
            status: col(row, "status")?,
            disbursed_at: col(row, "disbursed_at")?,
        })
    }

    fn insert_columns() -> &'static [&'static str] {
        &[
            "base_info_id",
            "payout_channel_id",
            "amount_cents",
            "status",
            "disbursed_at",
            "created_at",
            "updated_at",
        ]
    }

    fn insert_values(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Long(self.base_info_id as i64),
            SqlParam::Long(self.payout_channel_id as i64),
            SqlParam::Long(self.amount_cents),
            SqlParam::Int(self.status),
            SqlParam::OptTimestamp(self.disbursed_at),
            SqlParam::Timestamp(self.meta.created_at),
            SqlParam::Timestamp(self.meta.updated_at),
        ]
    }
}

/// Typed partial update; `Some` means update.
#[derive(Debug, Clone, Default)]
pub struct DisbursementPatch {
    pub payout_channel_id: Option<EntityId>,
    pub amount_cents: Option<i64>,
    pub status: Option<i32>,
    /// `Some(None)` clears the column back to NULL.
    pub disbursed_at: Option<Option<Timestamp>>,
}

impl DisbursementPatch {
    pub fn into_patch(self) -> Patch {
        let mut patch = Patch::new();
        if let Some(v) = self.payout_channel_id {
            patch = patch.set("payout_channel_id", v as i64);
        }
        if let Some(v) = self.amount_cents {
            patch = patch.set("amount_cents", v);
        }
        if let Some(v) = self.status {
            patch = patch.set("status", v as i64);
        }
        match self.disbursed_at {
            Some(Some(at)) => patch = patch.set("disbursed_at", at),
            Some(None) => patch = patch.set_null("disbursed_at"),
            None => {}
        }
        patch
    }
}

/// Join view: disbursement enriched with applicant and channel names.
/// Fixed projection over a fixed join graph; read-only, uncached.
static OVERVIEW: ViewDef = ViewDef {
    name: "disbursement_overview",
    projection: &[
        "d.id AS id",
        "d.amount_cents AS amount_cents",
        "d.status AS status",
        "d.disbursed_at AS disbursed_at",
        "b.applicant_name AS applicant_name",
        "c.name AS channel_name",
        "c.code AS channel_code",
    ],
    from: "disbursement d \
           JOIN loan_base_info b ON b.id = d.base_info_id \
           JOIN payout_channel c ON c.id = d.payout_channel_id",
    filterable: &[
        "d.id",
        "d.base_info_id",
        "d.status",
        "d.disbursed_at",
        "b.applicant_name",
        "c.code",
    ],
    live_filter: "d.deleted_at IS NULL AND b.deleted_at IS NULL AND c.deleted_at IS NULL",
    default_order: "d.id DESC",
    max_or_depth: 1,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementOverviewRow {
    pub id: EntityId,
    pub amount_cents: i64,
    pub status: i32,
    pub disbursed_at: Option<Timestamp>,
    pub applicant_name: String,
    pub channel_name: String,
    pub channel_code: String,
}

impl ViewRecord for DisbursementOverviewRow {
    fn view() -> &'static ViewDef {
        &OVERVIEW
    }

    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Self {
            id: id_col(row, "id")?,
            amount_cents: col(row, "amount_cents")?,
            status: col(row, "status")?,
            disbursed_at: col(row, "disbursed_at")?,
            applicant_name: col(row, "applicant_name")?,
            channel_name: col(row, "channel_name")?,
            channel_code: col(row, "channel_code")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::translate_view;
    use lendbase_core::Predicate;

    #[test]
    fn test_patch_can_clear_disbursed_at() {
        let patch = DisbursementPatch {
            disbursed_at: Some(None),
            ..Default::default()
        }
        .into_patch();
        let columns: Vec<&str> = patch.columns().collect();
        assert_eq!(columns, vec!["disbursed_at"]);
        assert!(patch.validate(DESCRIPTOR.updatable).is_ok());
    }

    #[test]
    fn test_overview_filters_through_qualified_whitelist() {
        let pred = Predicate::new()
            .and_eq("c.code", "ALIPAY")
            .and_eq("d.status", 3i64);
        let t = translate_view(&OVERVIEW, &pred, 500).unwrap();
        assert!(t.select_sql.contains("c.code = $1"));
        assert!(t.select_sql.contains("d.status = $2"));

        let bad = Predicate::new().and_eq("b.id_card_no", "x");
        assert!(translate_view(&OVERVIEW, &bad, 500).is_err());
    }
}

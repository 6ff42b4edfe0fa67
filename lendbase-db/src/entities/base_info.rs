//! Loan base info: the applicant-facing root record of a loan.

use std::time::Duration;

use lendbase_core::{Descriptor, Meta, StoreResult};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::param::SqlParam;
use crate::patch::Patch;
use crate::record::{col, meta_from_row, Record};

static DESCRIPTOR: Descriptor = Descriptor {
    kind: "loan_base_info",
    table: "loan_base_info",
    columns: &[
        "id",
        "applicant_name",
        "id_card_no",
        "phone",
        "loan_amount_cents",
        "status",
        "created_at",
        "updated_at",
        "deleted_at",
    ],
    filterable: &[
        "id",
        "applicant_name",
        "id_card_no",
        "phone",
        "status",
        "created_at",
    ],
    updatable: &[
        "applicant_name",
        "id_card_no",
        "phone",
        "loan_amount_cents",
        "status",
    ],
    cache_ttl: Duration::from_secs(3600),
    max_or_depth: 1,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanBaseInfo {
    pub meta: Meta,
    pub applicant_name: String,
    pub id_card_no: String,
    pub phone: String,
    /// Principal in cents; avoids decimal drift.
    pub loan_amount_cents: i64,
    pub status: i32,
}

impl Record for LoanBaseInfo {
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
            applicant_name: col(row, "applicant_name")?,
            id_card_no: col(row, "id_card_no")?,
            phone: col(row, "phone")?,
            loan_amount_cents: col(row, "loan_amount_cents")?,
            status: col(row, "status")?,
        })
    }

    fn insert_columns() -> &'static [&'static str] {
        &[
            "applicant_name",
            "id_card_no",
            "phone",
            "loan_amount_cents",
            "status",
            "created_at",
            "updated_at",
        ]
    }

    fn insert_values(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Text(self.applicant_name.clone()),
            SqlParam::Text(self.id_card_no.clone()),
            SqlParam::Text(self.phone.clone()),
            SqlParam::Long(self.loan_amount_cents),
            SqlParam::Int(self.status),
            SqlParam::Timestamp(self.meta.created_at),
            SqlParam::Timestamp(self.meta.updated_at),
        ]
    }
}

/// Typed partial update; `Some` means update, including zero values.
#[derive(Debug, Clone, Default)]
pub struct LoanBaseInfoPatch {
    pub applicant_name: Option<String>,
    pub id_card_no: Option<String>,
    pub phone: Option<String>,
    pub loan_amount_cents: Option<i64>,
    pub status: Option<i32>,
}

impl LoanBaseInfoPatch {
    pub fn into_patch(self) -> Patch {
        let mut patch = Patch::new();
        if let Some(v) = self.applicant_name {
            patch = patch.set("applicant_name", v);
        }
        if let Some(v) = self.id_card_no {
            patch = patch.set("id_card_no", v);
        }
        if let Some(v) = self.phone {
            patch = patch.set("phone", v);
        }
        if let Some(v) = self.loan_amount_cents {
            patch = patch.set("loan_amount_cents", v);
        }
        if let Some(v) = self.status {
            patch = patch.set("status", v as i64);
        }
        patch
    }
}

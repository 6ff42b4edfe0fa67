//! Payout channel: a configured disbursement rail and its fee terms.

use std::time::Duration;

use lendbase_core::{Descriptor, Meta, StoreResult};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::param::SqlParam;
use crate::patch::Patch;
use crate::record::{col, meta_from_row, Record};

static DESCRIPTOR: Descriptor = Descriptor {
    kind: "payout_channel",
    table: "payout_channel",
    columns: &[
        "id",
        "name",
        "code",
        "fee_rate",
        "enabled",
        "created_at",
        "updated_at",
        "deleted_at",
    ],
    filterable: &["id", "name", "code", "enabled", "created_at"],
    updatable: &["name", "fee_rate", "enabled"],
    cache_ttl: Duration::from_secs(3600),
    max_or_depth: 1,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutChannel {
    pub meta: Meta,
    pub name: String,
    /// Stable channel code, unique; immutable after creation.
    pub code: String,
    pub fee_rate: f64,
    pub enabled: bool,
}

impl Record for PayoutChannel {
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
            name: col(row, "name")?,
            code: col(row, "code")?,
            fee_rate: col(row, "fee_rate")?,
            enabled: col(row, "enabled")?,
        })
    }

    fn insert_columns() -> &'static [&'static str] {
        &[
            "name",
            "code",
            "fee_rate",
            "enabled",
            "created_at",
            "updated_at",
        ]
    }

    fn insert_values(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Text(self.name.clone()),
            SqlParam::Text(self.code.clone()),
            SqlParam::Double(self.fee_rate),
            SqlParam::Bool(self.enabled),
            SqlParam::Timestamp(self.meta.created_at),
            SqlParam::Timestamp(self.meta.updated_at),
        ]
    }
}

/// Typed partial update; `Some` means update. A fee rate of `0.0` is a
/// legitimate assignment and goes through like any other value.
#[derive(Debug, Clone, Default)]
pub struct PayoutChannelPatch {
    pub name: Option<String>,
    pub fee_rate: Option<f64>,
    pub enabled: Option<bool>,
}

impl PayoutChannelPatch {
    pub fn into_patch(self) -> Patch {
        let mut patch = Patch::new();
        if let Some(v) = self.name {
            patch = patch.set("name", v);
        }
        if let Some(v) = self.fee_rate {
            patch = patch.set("fee_rate", v);
        }
        if let Some(v) = self.enabled {
            patch = patch.set("enabled", v);
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendbase_core::SqlValue;

    #[test]
    fn test_zero_fee_rate_is_a_real_update() {
        let patch = PayoutChannelPatch {
            fee_rate: Some(0.0),
            ..Default::default()
        }
        .into_patch();
        assert_eq!(
            patch.entries(),
            &[("fee_rate".to_string(), SqlValue::Float(0.0))]
        );
        assert!(patch.validate(DESCRIPTOR.updatable).is_ok());
    }

    #[test]
    fn test_channel_code_is_not_updatable() {
        let patch = Patch::new().set("code", "NEWCODE");
        assert!(patch.validate(DESCRIPTOR.updatable).is_err());
    }
}

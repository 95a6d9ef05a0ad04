use std::str::FromStr;

use aggregator_bundle::Bundle;
use aggregator_execution_client_interface::SubmissionReceipt;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::queue::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BundleStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A bundle waiting in the queue together with its retry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRow {
    pub id: i64,
    pub status: BundleStatus,
    pub hash: B256,
    pub bundle: Bundle,
    /// Block number from which the row may be selected.
    pub eligible_after: u64,
    /// Blocks added to `eligible_after` the next time this row fails.
    pub next_eligibility_delay: u64,
    pub submit_error: Option<String>,
    pub receipt: Option<SubmissionReceipt>,
}

impl BundleRow {
    pub fn is_eligible_at(&self, block: u64) -> bool {
        self.status == BundleStatus::Pending && self.eligible_after <= block
    }
}

/// A row before the store has assigned it an id.
#[derive(Debug, Clone)]
pub struct NewBundleRow {
    pub hash: B256,
    pub bundle: Bundle,
    pub eligible_after: u64,
    pub next_eligibility_delay: u64,
}

impl NewBundleRow {
    pub fn pending(bundle: Bundle, current_block: u64) -> Self {
        Self { hash: bundle.content_hash(), bundle, eligible_after: current_block, next_eligibility_delay: 1 }
    }
}

/// Column values as stored, before decoding.
pub(crate) struct StoredRow {
    pub id: i64,
    pub status: String,
    pub hash: String,
    pub bundle: String,
    pub eligible_after: String,
    pub next_eligibility_delay: String,
    pub submit_error: Option<String>,
    pub receipt: Option<String>,
}

impl StoredRow {
    pub(crate) const COLUMNS: &'static str =
        "id, status, hash, bundle, eligible_after, next_eligibility_delay, submit_error, receipt";

    pub(crate) fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            status: row.get(1)?,
            hash: row.get(2)?,
            bundle: row.get(3)?,
            eligible_after: row.get(4)?,
            next_eligibility_delay: row.get(5)?,
            submit_error: row.get(6)?,
            receipt: row.get(7)?,
        })
    }
}

impl TryFrom<StoredRow> for BundleRow {
    type Error = DatabaseError;

    fn try_from(stored: StoredRow) -> Result<Self, Self::Error> {
        let status = BundleStatus::from_str(&stored.status)
            .map_err(|_| DatabaseError::InvalidColumn { column: "status", value: stored.status.clone() })?;
        let hash = B256::from_str(&stored.hash)
            .map_err(|_| DatabaseError::InvalidColumn { column: "hash", value: stored.hash.clone() })?;
        let bundle = serde_json::from_str(&stored.bundle)
            .map_err(|source| DatabaseError::Serialization { column: "bundle", source })?;
        let receipt = stored
            .receipt
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|source| DatabaseError::Serialization { column: "receipt", source })?;

        Ok(Self {
            id: stored.id,
            status,
            hash,
            bundle,
            eligible_after: decode_block("eligible_after", &stored.eligible_after)?,
            next_eligibility_delay: decode_block("next_eligibility_delay", &stored.next_eligibility_delay)?,
            submit_error: stored.submit_error,
            receipt,
        })
    }
}

/// Block numbers are stored as zero-padded hex so that text comparison matches numeric order.
pub(crate) fn encode_block(value: u64) -> String {
    format!("{value:064x}")
}

pub(crate) fn decode_block(column: &'static str, value: &str) -> Result<u64, DatabaseError> {
    u64::from_str_radix(value, 16).map_err(|_| DatabaseError::InvalidColumn { column, value: value.to_string() })
}

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::db::error::StoreError;
use crate::db::gateway::WitnessRow;

/// Pipeline stage of one batch witness.
///
/// Stored as a small integer; the claim protocol only moves records
/// forward through this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessStatus {
    Published,
    Received,
    Finished,
}

impl WitnessStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            WitnessStatus::Published => 0,
            WitnessStatus::Received => 1,
            WitnessStatus::Finished => 2,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self, StoreError> {
        match value {
            0 => Ok(WitnessStatus::Published),
            1 => Ok(WitnessStatus::Received),
            2 => Ok(WitnessStatus::Finished),
            other => Err(StoreError::Storage(format!(
                "invalid witness status value in database: {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WitnessStatus::Published => "published",
            WitnessStatus::Received => "received",
            WitnessStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for WitnessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WitnessStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "published" => Ok(WitnessStatus::Published),
            "received" => Ok(WitnessStatus::Received),
            "finished" => Ok(WitnessStatus::Finished),
            other => Err(format!(
                "unknown witness status {other:?} (expected published, received, or finished)"
            )),
        }
    }
}

/// Materialized batch-witness record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWitness {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
    pub height: i64,
    pub witness_data: String,
    pub status: WitnessStatus,
}

/// Insert payload for one batch-witness record; `id` and timestamps are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatchWitness {
    pub height: i64,
    pub witness_data: String,
    pub status: WitnessStatus,
}

/// Per-stage row counts over active (non-deleted) records.
///
/// The four counts come from independent statements, so under concurrent
/// mutation they may reflect slightly different instants and need not sum
/// exactly to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageCounts {
    pub total: i64,
    pub published: i64,
    pub received: i64,
    pub finished: i64,
}

pub(crate) fn map_witness_row(row: WitnessRow) -> Result<BatchWitness, StoreError> {
    Ok(BatchWitness {
        id: row.id,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
        height: row.height,
        witness_data: row.witness_data,
        status: WitnessStatus::from_i64(row.status)?,
    })
}

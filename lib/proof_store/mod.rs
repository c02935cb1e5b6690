//! Keyed CRUD store for finalized batch proofs.
//!
//! A peer of the witness queue: it shares the statement gateway and error
//! taxonomy but has no claim or transition semantics. Proof rows are
//! written once per finished batch and read back by publication.

use chrono::NaiveDateTime;

use crate::db::error::StoreError;
use crate::db::gateway::{qualified_table, ProofRow, StoreDb};

pub const PROOF_TABLE_PREFIX: &str = "proof";

/// Finalized proof for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
    pub proof_data: String,
    pub asset_list_commitments: String,
    pub account_tree_roots: String,
    pub batch_commitment: String,
    pub assets_count: i32,
    pub batch_number: i64,
}

/// Insert payload; `id` and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProof {
    pub proof_data: String,
    pub asset_list_commitments: String,
    pub account_tree_roots: String,
    pub batch_commitment: String,
    pub assets_count: i32,
    pub batch_number: i64,
}

#[derive(Debug, Clone)]
pub struct ProofStore {
    table: String,
}

fn map_proof_row(row: ProofRow) -> Proof {
    Proof {
        id: row.id,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
        proof_data: row.proof_data,
        asset_list_commitments: row.asset_list_commitments,
        account_tree_roots: row.account_tree_roots,
        batch_commitment: row.batch_commitment,
        assets_count: row.assets_count,
        batch_number: row.batch_number,
    }
}

const PROOF_COLUMNS: &str = "id, created_at, updated_at, deleted_at, proof_data, \
     asset_list_commitments, account_tree_roots, batch_commitment, assets_count, batch_number";

impl ProofStore {
    pub fn new(suffix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            table: qualified_table(PROOF_TABLE_PREFIX, suffix)?,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Inserts one finalized proof. A duplicate batch number surfaces as
    /// `Conflict`; an insert that affects no rows is a storage failure.
    pub fn create<C: StoreDb>(&self, conn: &mut C, proof: &NewProof) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (proof_data, asset_list_commitments, account_tree_roots, \
             batch_commitment, assets_count, batch_number, created_at, updated_at) \
             VALUES ({}, {}, {}, {}, {}, {}, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
            C::placeholder(3),
            C::placeholder(4),
            C::placeholder(5),
            C::placeholder(6),
        );
        let affected = conn.exec(
            &sql,
            vec![
                proof.proof_data.clone().into(),
                proof.asset_list_commitments.clone().into(),
                proof.account_tree_roots.clone().into(),
                proof.batch_commitment.clone().into(),
                proof.assets_count.into(),
                proof.batch_number.into(),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::Storage(format!(
                "proof insert for batch {} affected no rows",
                proof.batch_number
            )));
        }
        Ok(())
    }

    /// Returns proofs with batch numbers in `[start, end]`, ascending.
    pub fn proofs_between<C: StoreDb>(
        &self,
        conn: &mut C,
        start: i64,
        end: i64,
    ) -> Result<Vec<Proof>, StoreError> {
        let sql = format!(
            "SELECT {PROOF_COLUMNS} FROM {} \
             WHERE batch_number >= {} AND batch_number <= {} AND deleted_at IS NULL \
             ORDER BY batch_number ASC",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
        );
        let rows = conn.load_proofs(&sql, vec![start.into(), end.into()])?;
        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(rows.into_iter().map(map_proof_row).collect())
    }

    /// Returns the proof with the highest batch number.
    pub fn latest<C: StoreDb>(&self, conn: &mut C) -> Result<Proof, StoreError> {
        let sql = format!(
            "SELECT {PROOF_COLUMNS} FROM {} \
             WHERE deleted_at IS NULL \
             ORDER BY batch_number DESC LIMIT 1",
            self.table,
        );
        let mut rows = conn.load_proofs(&sql, Vec::new())?;
        rows.pop().map(map_proof_row).ok_or(StoreError::NotFound)
    }

    pub fn by_batch_number<C: StoreDb>(
        &self,
        conn: &mut C,
        batch_number: i64,
    ) -> Result<Proof, StoreError> {
        let sql = format!(
            "SELECT {PROOF_COLUMNS} FROM {} \
             WHERE batch_number = {} AND deleted_at IS NULL \
             LIMIT 1",
            self.table,
            C::placeholder(1),
        );
        let mut rows = conn.load_proofs(&sql, vec![batch_number.into()])?;
        rows.pop().map(map_proof_row).ok_or(StoreError::NotFound)
    }

    /// Counts active proof rows.
    pub fn row_count<C: StoreDb>(&self, conn: &mut C) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) AS value FROM {} WHERE deleted_at IS NULL",
            self.table,
        );
        let mut rows = conn.load_bigints(&sql, Vec::new())?;
        rows.pop()
            .map(|row| row.value)
            .ok_or_else(|| StoreError::Storage("count query returned no rows".to_string()))
    }
}

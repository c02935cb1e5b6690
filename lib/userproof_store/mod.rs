//! Keyed CRUD store for per-account proof exports.
//!
//! Rows are written in bulk once a batch finishes and are only ever read
//! back by account lookups; there is no lifecycle beyond insert.

use chrono::NaiveDateTime;

use crate::db::error::StoreError;
use crate::db::gateway::{qualified_table, StoreDb, UserProofRow};

pub const USERPROOF_TABLE_PREFIX: &str = "userproof";

/// Inclusion proof and balance snapshot for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProof {
    pub account_index: i64,
    pub account_id: String,
    pub account_leaf_hash: String,
    pub total_equity: String,
    pub total_debt: String,
    pub total_collateral: String,
    pub assets: String,
    pub proof: String,
    pub config: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Insert payload; timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserProof {
    pub account_index: i64,
    pub account_id: String,
    pub account_leaf_hash: String,
    pub total_equity: String,
    pub total_debt: String,
    pub total_collateral: String,
    pub assets: String,
    pub proof: String,
    pub config: String,
}

#[derive(Debug, Clone)]
pub struct UserProofStore {
    table: String,
}

fn map_userproof_row(row: UserProofRow) -> UserProof {
    UserProof {
        account_index: row.account_index,
        account_id: row.account_id,
        account_leaf_hash: row.account_leaf_hash,
        total_equity: row.total_equity,
        total_debt: row.total_debt,
        total_collateral: row.total_collateral,
        assets: row.assets,
        proof: row.proof,
        config: row.config,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

const USERPROOF_COLUMNS: &str = "account_index, account_id, account_leaf_hash, total_equity, \
     total_debt, total_collateral, assets, proof, config, created_at, updated_at";

impl UserProofStore {
    pub fn new(suffix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            table: qualified_table(USERPROOF_TABLE_PREFIX, suffix)?,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Inserts each row independently; an empty list is a no-op and a
    /// duplicate account index or id surfaces as `Conflict`.
    pub fn create_user_proofs<C: StoreDb>(
        &self,
        conn: &mut C,
        rows: &[NewUserProof],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (account_index, account_id, account_leaf_hash, total_equity, \
             total_debt, total_collateral, assets, proof, config, created_at, updated_at) \
             VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
            C::placeholder(3),
            C::placeholder(4),
            C::placeholder(5),
            C::placeholder(6),
            C::placeholder(7),
            C::placeholder(8),
            C::placeholder(9),
        );

        for row in rows {
            let affected = conn.exec(
                &sql,
                vec![
                    row.account_index.into(),
                    row.account_id.clone().into(),
                    row.account_leaf_hash.clone().into(),
                    row.total_equity.clone().into(),
                    row.total_debt.clone().into(),
                    row.total_collateral.clone().into(),
                    row.assets.clone().into(),
                    row.proof.clone().into(),
                    row.config.clone().into(),
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::Storage(format!(
                    "user proof insert for account index {} affected no rows",
                    row.account_index
                )));
            }
        }

        Ok(())
    }

    pub fn by_account_index<C: StoreDb>(
        &self,
        conn: &mut C,
        account_index: i64,
    ) -> Result<UserProof, StoreError> {
        let sql = format!(
            "SELECT {USERPROOF_COLUMNS} FROM {} WHERE account_index = {} LIMIT 1",
            self.table,
            C::placeholder(1),
        );
        let mut rows = conn.load_userproofs(&sql, vec![account_index.into()])?;
        rows.pop().map(map_userproof_row).ok_or(StoreError::NotFound)
    }

    pub fn by_account_id<C: StoreDb>(
        &self,
        conn: &mut C,
        account_id: &str,
    ) -> Result<UserProof, StoreError> {
        let sql = format!(
            "SELECT {USERPROOF_COLUMNS} FROM {} WHERE account_id = {} LIMIT 1",
            self.table,
            C::placeholder(1),
        );
        let mut rows = conn.load_userproofs(&sql, vec![account_id.into()])?;
        rows.pop().map(map_userproof_row).ok_or(StoreError::NotFound)
    }

    /// Returns the highest account index written so far.
    pub fn latest_account_index<C: StoreDb>(&self, conn: &mut C) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT account_index AS value FROM {} ORDER BY account_index DESC LIMIT 1",
            self.table,
        );
        let mut rows = conn.load_bigints(&sql, Vec::new())?;
        rows.pop().map(|row| row.value).ok_or(StoreError::NotFound)
    }

    pub fn user_count<C: StoreDb>(&self, conn: &mut C) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS value FROM {}", self.table);
        let mut rows = conn.load_bigints(&sql, Vec::new())?;
        rows.pop()
            .map(|row| row.value)
            .ok_or_else(|| StoreError::Storage("count query returned no rows".to_string()))
    }
}

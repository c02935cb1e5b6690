use diesel::backend::Backend;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_query;
use diesel::sql_types::{BigInt, HasSqlType, Integer, Nullable, Text, Timestamp};
use diesel::sqlite::SqliteConnection;

use chrono::NaiveDateTime;

use super::error::StoreError;

/// A single bound statement parameter.
///
/// Row values always travel through these binds; the only text ever
/// interpolated into a statement is the table name fixed at store
/// construction.
#[derive(Debug, Clone)]
pub enum SqlParam {
    BigInt(i64),
    Int(i32),
    Text(String),
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::BigInt(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        SqlParam::Int(value)
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct WitnessRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Timestamp)]
    pub created_at: NaiveDateTime,
    #[diesel(sql_type = Timestamp)]
    pub updated_at: NaiveDateTime,
    #[diesel(sql_type = Nullable<Timestamp>)]
    pub deleted_at: Option<NaiveDateTime>,
    #[diesel(sql_type = BigInt)]
    pub height: i64,
    #[diesel(sql_type = Text)]
    pub witness_data: String,
    #[diesel(sql_type = BigInt)]
    pub status: i64,
}

/// One-column integer result, used for heights, counts, and index scans.
/// Queries must alias the projected column as `value`.
#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct BigIntRow {
    #[diesel(sql_type = BigInt)]
    pub value: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct ProofRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Timestamp)]
    pub created_at: NaiveDateTime,
    #[diesel(sql_type = Timestamp)]
    pub updated_at: NaiveDateTime,
    #[diesel(sql_type = Nullable<Timestamp>)]
    pub deleted_at: Option<NaiveDateTime>,
    #[diesel(sql_type = Text)]
    pub proof_data: String,
    #[diesel(sql_type = Text)]
    pub asset_list_commitments: String,
    #[diesel(sql_type = Text)]
    pub account_tree_roots: String,
    #[diesel(sql_type = Text)]
    pub batch_commitment: String,
    #[diesel(sql_type = Integer)]
    pub assets_count: i32,
    #[diesel(sql_type = BigInt)]
    pub batch_number: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct UserProofRow {
    #[diesel(sql_type = BigInt)]
    pub account_index: i64,
    #[diesel(sql_type = Text)]
    pub account_id: String,
    #[diesel(sql_type = Text)]
    pub account_leaf_hash: String,
    #[diesel(sql_type = Text)]
    pub total_equity: String,
    #[diesel(sql_type = Text)]
    pub total_debt: String,
    #[diesel(sql_type = Text)]
    pub total_collateral: String,
    #[diesel(sql_type = Text)]
    pub assets: String,
    #[diesel(sql_type = Text)]
    pub proof: String,
    #[diesel(sql_type = Text)]
    pub config: String,
    #[diesel(sql_type = Timestamp)]
    pub created_at: NaiveDateTime,
    #[diesel(sql_type = Timestamp)]
    pub updated_at: NaiveDateTime,
}

/// Minimal statement-execution capability consumed by the stores.
///
/// Stores hold no connection themselves; every operation borrows one of
/// these for its duration. Transactions come from the `Connection`
/// supertrait: a `transaction` closure scope offering the same execute
/// and load primitives, committed on `Ok` and rolled back on `Err`.
///
/// The two seam methods absorb the backend differences that matter here:
/// bind-placeholder syntax (`$N` vs `?`) and the row-locking clause
/// (SQLite serializes writers at the database level, so its claim
/// transactions need no per-row locks).
pub trait StoreDb: Connection {
    /// Renders the bind placeholder for the 1-based parameter `index`.
    fn placeholder(index: usize) -> String;

    /// Suffix appended to claim selects to lock the selected rows for
    /// the rest of the transaction.
    fn row_lock_clause() -> &'static str;

    fn exec(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<usize>;
    fn load_witnesses(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<WitnessRow>>;
    fn load_bigints(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<BigIntRow>>;
    fn load_proofs(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<ProofRow>>;
    fn load_userproofs(
        &mut self,
        sql: &str,
        params: Vec<SqlParam>,
    ) -> QueryResult<Vec<UserProofRow>>;
}

fn bind_params<DB>(
    query: BoxedSqlQuery<'static, DB, SqlQuery>,
    params: Vec<SqlParam>,
) -> BoxedSqlQuery<'static, DB, SqlQuery>
where
    DB: Backend + HasSqlType<BigInt> + HasSqlType<Integer> + HasSqlType<Text>,
    i64: diesel::serialize::ToSql<BigInt, DB>,
    i32: diesel::serialize::ToSql<Integer, DB>,
    String: diesel::serialize::ToSql<Text, DB>,
{
    params.into_iter().fold(query, |query, param| match param {
        SqlParam::BigInt(value) => query.bind::<BigInt, _>(value),
        SqlParam::Int(value) => query.bind::<Integer, _>(value),
        SqlParam::Text(value) => query.bind::<Text, _>(value),
    })
}

impl StoreDb for PgConnection {
    fn placeholder(index: usize) -> String {
        format!("${index}")
    }

    fn row_lock_clause() -> &'static str {
        " FOR UPDATE"
    }

    fn exec(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<usize> {
        bind_params(sql_query(sql).into_boxed::<diesel::pg::Pg>(), params).execute(self)
    }

    fn load_witnesses(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<WitnessRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::pg::Pg>(), params).load(self)
    }

    fn load_bigints(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<BigIntRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::pg::Pg>(), params).load(self)
    }

    fn load_proofs(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<ProofRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::pg::Pg>(), params).load(self)
    }

    fn load_userproofs(
        &mut self,
        sql: &str,
        params: Vec<SqlParam>,
    ) -> QueryResult<Vec<UserProofRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::pg::Pg>(), params).load(self)
    }
}

impl StoreDb for SqliteConnection {
    fn placeholder(_index: usize) -> String {
        "?".to_string()
    }

    fn row_lock_clause() -> &'static str {
        ""
    }

    fn exec(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<usize> {
        bind_params(sql_query(sql).into_boxed::<diesel::sqlite::Sqlite>(), params).execute(self)
    }

    fn load_witnesses(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<WitnessRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::sqlite::Sqlite>(), params).load(self)
    }

    fn load_bigints(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<BigIntRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::sqlite::Sqlite>(), params).load(self)
    }

    fn load_proofs(&mut self, sql: &str, params: Vec<SqlParam>) -> QueryResult<Vec<ProofRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::sqlite::Sqlite>(), params).load(self)
    }

    fn load_userproofs(
        &mut self,
        sql: &str,
        params: Vec<SqlParam>,
    ) -> QueryResult<Vec<UserProofRow>> {
        bind_params(sql_query(sql).into_boxed::<diesel::sqlite::Sqlite>(), params).load(self)
    }
}

/// Builds `{prefix}{suffix}` after rejecting suffixes that could widen the
/// statement text beyond an identifier. Suffixes come from trusted
/// configuration, never from request data; this check keeps that contract
/// honest at the one place a name reaches statement text.
pub(crate) fn qualified_table(prefix: &str, suffix: &str) -> Result<String, StoreError> {
    if !suffix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(StoreError::InvalidInput(format!(
            "table suffix {suffix:?} may only contain ASCII alphanumerics and underscores"
        )));
    }
    Ok(format!("{prefix}{suffix}"))
}

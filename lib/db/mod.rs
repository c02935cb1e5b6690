//! Connection construction and the statement-execution gateway.
//!
//! Every statement the stores issue goes through [`gateway::StoreDb`], and
//! every connection built here carries an advisory maximum-execution-time
//! ceiling: runaway statements are terminated by the database and surface
//! as [`error::StoreError::Storage`], never silently truncated.

pub mod error;
pub mod gateway;

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::Connection;

use error::StoreError;

/// Default per-statement ceiling when `STATEMENT_TIMEOUT_MS` is unset.
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

/// Opens a Postgres connection and pins `statement_timeout` for the
/// session, so the ceiling rides along with every statement issued on it.
pub fn connect(db_url: &str, statement_timeout_ms: u64) -> Result<PgConnection, StoreError> {
    let mut conn = PgConnection::establish(db_url)
        .map_err(|err| StoreError::Storage(format!("failed to connect to postgres: {err}")))?;

    conn.batch_execute(&format!("SET statement_timeout = {statement_timeout_ms}"))
        .map_err(|err| StoreError::Storage(format!("failed to set statement timeout: {err}")))?;

    Ok(conn)
}

use std::env;
use thiserror::Error;

use crate::db::DEFAULT_STATEMENT_TIMEOUT_MS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

pub struct Config {
    pub db_url: String,
    /// Table-name suffix shared by every store in this deployment.
    /// Default: empty (unsuffixed tables).
    pub table_suffix: String,
    /// Advisory per-statement ceiling in milliseconds.
    pub statement_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let table_suffix = env::var("TABLE_SUFFIX").unwrap_or_default();

        let statement_timeout_ms = match env::var("STATEMENT_TIMEOUT_MS") {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "STATEMENT_TIMEOUT_MS".to_string(),
                    value: val,
                })?,
            Err(_) => DEFAULT_STATEMENT_TIMEOUT_MS,
        };

        Ok(Self {
            db_url,
            table_suffix,
            statement_timeout_ms,
        })
    }
}

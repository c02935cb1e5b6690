use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

/// Closed error taxonomy exposed by every store in this crate.
///
/// Backend-specific errors are translated here at the boundary and never
/// escape the store interfaces. `NotFound` on a claim means "no work
/// available at this stage right now" and is the expected steady-state
/// signal; callers should not log it as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no rows matched the requested predicate")]
    NotFound,

    #[error("uniqueness constraint violated: {0}")]
    Conflict(String),

    #[error("storage operation failed: {0}")]
    Storage(String),

    #[error("invalid store input: {0}")]
    InvalidInput(String),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(kind, info) => {
                StoreError::Storage(format!("database error ({kind:?}): {}", info.message()))
            }
            other => StoreError::Storage(other.to_string()),
        }
    }
}

impl StoreError {
    /// True when the error is the benign "nothing matched" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

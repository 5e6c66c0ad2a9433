//! Error types for LocalWeave

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmulatorError {
    #[error("Duplicate id: {0}")]
    DuplicateId(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Schema bootstrap failed: {0}")]
    SchemaBootstrap(String),
    #[error("Mining round failed: {0}")]
    MiningPersistence(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl EmulatorError {
    /// Re-labels a failure that happened inside a mining round. Lookup misses and
    /// input errors keep their kind so the caller can still tell them apart.
    pub(crate) fn into_mining(self) -> Self {
        match self {
            EmulatorError::NotFound(_)
            | EmulatorError::InvalidInput(_)
            | EmulatorError::MiningPersistence(_) => self,
            EmulatorError::Database(msg) | EmulatorError::Serialization(msg) => {
                EmulatorError::MiningPersistence(msg)
            }
            other => EmulatorError::MiningPersistence(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EmulatorError {
    fn from(err: rusqlite::Error) -> Self {
        EmulatorError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for EmulatorError {
    fn from(err: serde_json::Error) -> Self {
        EmulatorError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EmulatorError {
    fn from(err: std::io::Error) -> Self {
        EmulatorError::Io(err.to_string())
    }
}

/// Returns true when `err` is a primary key / unique constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, EmulatorError>;

use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Validation error: field '{field}' is not editable on {entity} entries")]
    InvalidField { entity: String, field: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("Format error in {file}: {reason}")]
    FormatError { file: String, reason: String },
    #[error("Revert error: {0}")]
    RevertError(String),
}

impl LedgerError {
    /// True for the caller-input failures: bad field names, bad enum values,
    /// missing keys.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::ValidationError(_) | LedgerError::InvalidField { .. }
        )
    }
}

/// True when a SQLite error is a UNIQUE/PRIMARY KEY constraint violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Translate a unique-constraint failure into a `ConflictError` naming the key;
/// every other SQLite error passes through unchanged.
pub fn conflict_on_unique(err: rusqlite::Error, key: impl FnOnce() -> String) -> LedgerError {
    if is_unique_violation(&err) {
        LedgerError::ConflictError(format!("natural key already exists: {}", key()))
    } else {
        LedgerError::RusqliteError(err)
    }
}

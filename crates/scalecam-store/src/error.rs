//! Error types for scalecam-store.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use scalecam_types::ParseError;

/// Result type for scalecam-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in scalecam-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A single measurement could not be written.
    #[error("Failed to write measurement: {0}")]
    Write(#[source] rusqlite::Error),

    /// A batch was rejected; nothing from it was committed.
    #[error("Batch write failed at row {row}: {reason}")]
    BatchWrite { row: usize, reason: String },

    /// The measurements table name is not a plain identifier.
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),

    /// Calibration parameters were rejected.
    #[error(transparent)]
    InvalidCalibration(#[from] ParseError),

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same operation may succeed.
    ///
    /// Only lock contention (another connection holding the database) is
    /// treated as transient.
    pub fn is_retryable(&self) -> bool {
        let sqlite = match self {
            Error::Database(e) | Error::Write(e) => e,
            _ => return false,
        };
        matches!(
            sqlite.sqlite_error_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

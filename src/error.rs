//! Error types for nginx-sqlize
//!
//! This module defines the error hierarchy used by the ingestion pipeline:
//! - SQLite storage errors
//! - Configuration and CLI errors
//! - I/O errors opening or reading a source log file
//!
//! Lines that fail to parse and files that cannot be fingerprinted are not
//! errors: the parser reports a miss that the coordinator counts, and the
//! change detector treats an unhashable file as dirty.

use crate::ingest::FileStage;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a single file's ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Failed to open a source log file
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed while reading a source log file
    #[error("Failed to read '{path}' at byte {offset}: {source}")]
    Read {
        path: PathBuf,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// Other I/O errors (path resolution, metadata)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

impl IngestError {
    /// Check if the failure came from the storage layer
    pub fn is_storage(&self) -> bool {
        matches!(self, IngestError::Database(_))
    }
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to create database file
    #[error("Failed to create database at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Schema error
    #[error("Database schema error: {0}")]
    Schema(String),

    /// Database is locked
    #[error("Database is locked - another process may be using it")]
    Locked,
}

impl DbError {
    /// Map SQLite busy/locked failures onto [`DbError::Locked`]
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                DbError::Locked
            }
            _ => DbError::Sqlite(err),
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Invalid busy timeout
    #[error("Invalid busy timeout {secs}s: must be at least {min}s")]
    InvalidBusyTimeout { secs: u64, min: u64 },

    /// Invalid input pattern
    #[error("Invalid log pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Database path error
    #[error("Invalid database path '{path}': {reason}")]
    InvalidDbPath { path: PathBuf, reason: String },
}

/// Result type alias for IngestError
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Represents the outcome of ingesting a single file
#[derive(Debug)]
pub enum FileOutcome {
    /// File was read to the end and committed
    Processed {
        path: String,
        lines_read: u64,
        records_inserted: u64,
        parse_errors: u64,
    },

    /// Change detector found nothing new
    Skipped { path: String, reason: String },

    /// Run stopped between batches; the last checkpoint is kept
    Interrupted {
        path: String,
        lines_read: u64,
        records_inserted: u64,
        parse_errors: u64,
    },

    /// Failed in `stage`; state committed before the failing batch is kept
    Failed {
        path: String,
        stage: FileStage,
        error: IngestError,
    },
}

impl FileOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Processed { .. } | FileOutcome::Skipped { .. })
    }

    /// Returns true if the run for this file failed
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }

    /// Returns the path associated with this outcome
    pub fn path(&self) -> &str {
        match self {
            FileOutcome::Processed { path, .. } => path,
            FileOutcome::Skipped { path, .. } => path,
            FileOutcome::Interrupted { path, .. } => path,
            FileOutcome::Failed { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let db_err = DbError::Schema("missing table".into());
        let ingest_err: IngestError = db_err.into();
        assert!(matches!(ingest_err, IngestError::Database(_)));
        assert!(ingest_err.is_storage());
    }

    #[test]
    fn test_busy_maps_to_locked() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DbError::from_sqlite(busy), DbError::Locked));

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(DbError::from_sqlite(other), DbError::Sqlite(_)));
    }

    #[test]
    fn test_outcome_classification() {
        let skipped = FileOutcome::Skipped {
            path: "/var/log/nginx/access.log".into(),
            reason: "unchanged".into(),
        };
        assert!(skipped.is_success());
        assert!(!skipped.is_failure());
        assert_eq!(skipped.path(), "/var/log/nginx/access.log");

        let failed = FileOutcome::Failed {
            path: "/missing.log".into(),
            stage: FileStage::Pending,
            error: IngestError::Interrupted,
        };
        assert!(failed.is_failure());
        assert!(!failed.is_success());

        let interrupted = FileOutcome::Interrupted {
            path: "/var/log/nginx/access.log".into(),
            lines_read: 12,
            records_inserted: 10,
            parse_errors: 2,
        };
        assert!(!interrupted.is_success());
        assert!(!interrupted.is_failure());
    }
}

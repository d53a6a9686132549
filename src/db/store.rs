//! Storage API for the ingestion pipeline
//!
//! [`LogStore`] owns the SQLite connection; dropping it closes the
//! connection on every exit path. Writes go through [`StoreTransaction`],
//! which is opened with `BEGIN IMMEDIATE` so the write lock is taken up
//! front and bounded by the busy timeout. A transaction that is dropped
//! without [`StoreTransaction::commit`] rolls back.
//!
//! Record inserts and file-state upserts can share one transaction, which
//! is how the coordinator commits data and checkpoint metadata atomically.

use crate::db::queries::DUPLICATE_KEY;
use crate::db::schema;
use crate::error::{DbError, DbResult};
use crate::parser::LogRecord;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default wait for the SQLite write lock
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Processing state for one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    /// Absolute path of the source file
    pub filename: String,

    /// Bytes of the (decompressed) stream covered by committed records
    pub last_offset: u64,

    /// Lines covered by committed records
    pub lines_processed: u64,

    /// Fingerprint hash taken when the run started
    pub file_hash: String,

    /// On-disk size when the fingerprint was taken
    pub file_size: u64,

    /// True once the end of stream was reached and committed
    pub complete: bool,

    /// RFC 3339 time of the last commit
    pub last_processed: String,
}

/// Values written by a file-state upsert
#[derive(Debug, Clone, Copy)]
pub struct FileCheckpoint<'a> {
    pub filename: &'a str,
    pub offset: u64,
    pub lines_processed: u64,
    pub file_hash: &'a str,
    pub file_size: u64,
    pub complete: bool,
}

/// SQLite-backed store for log records and file state
pub struct LogStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl LogStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path, busy_timeout: Duration) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DbError::CreateFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        schema::create_database(&conn)?;
        debug!(path = %path.display(), "Database opened");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_database(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Underlying connection, for read-only reporting queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction, taking the write lock immediately
    pub fn transaction(&mut self) -> DbResult<StoreTransaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DbError::from_sqlite)?;
        Ok(StoreTransaction { tx })
    }

    /// Insert a batch in its own transaction
    pub fn insert_records(&mut self, records: &[LogRecord], processed_at: &str) -> DbResult<usize> {
        let tx = self.transaction()?;
        let inserted = tx.insert_records(records, processed_at)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Upsert file state in its own transaction
    pub fn upsert_file_state(&mut self, checkpoint: &FileCheckpoint<'_>) -> DbResult<()> {
        let tx = self.transaction()?;
        tx.upsert_file_state(checkpoint)?;
        tx.commit()
    }

    /// Look up stored state for a file
    pub fn get_file_state(&self, filename: &str) -> DbResult<Option<FileState>> {
        let state = self
            .conn
            .query_row(
                "SELECT filename, last_offset, lines_processed, file_hash, file_size, complete,
                        COALESCE(last_processed, '')
                 FROM processed_files WHERE filename = ?1",
                [filename],
                |row| {
                    Ok(FileState {
                        filename: row.get(0)?,
                        last_offset: row.get::<_, i64>(1)?.max(0) as u64,
                        lines_processed: row.get::<_, i64>(2)?.max(0) as u64,
                        file_hash: row.get(3)?,
                        file_size: row.get::<_, i64>(4)?.max(0) as u64,
                        complete: row.get(5)?,
                        last_processed: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Total log records
    pub fn count_records(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Total tracked files
    pub fn count_files(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM processed_files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Rebuild the database file, reclaiming free pages
    pub fn vacuum(&self) -> DbResult<()> {
        self.conn.execute_batch("VACUUM").map_err(DbError::from_sqlite)?;
        debug!("Database vacuumed");
        Ok(())
    }
}

/// An open write transaction
pub struct StoreTransaction<'a> {
    tx: Transaction<'a>,
}

impl StoreTransaction<'_> {
    /// Bulk insert records, returning how many rows SQLite accepted
    pub fn insert_records(&self, records: &[LogRecord], processed_at: &str) -> DbResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO logs (
                timestamp, remote_addr, remote_user, request_method,
                request_path, http_version, status, bytes_sent,
                referer, user_agent, processed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;

        let mut inserted = 0usize;
        for record in records {
            inserted += stmt.execute(params![
                record.timestamp,
                record.remote_addr,
                record.remote_user,
                record.request_method,
                record.request_path,
                record.http_version,
                record.status,
                record.bytes_sent,
                record.referer,
                record.user_agent,
                processed_at,
            ])?;
        }

        Ok(inserted)
    }

    /// Insert or overwrite the state row for a file
    pub fn upsert_file_state(&self, checkpoint: &FileCheckpoint<'_>) -> DbResult<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.tx.execute(
            "INSERT INTO processed_files
                (filename, last_offset, lines_processed, file_hash, file_size, complete, last_processed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(filename) DO UPDATE SET
                last_offset = excluded.last_offset,
                lines_processed = excluded.lines_processed,
                file_hash = excluded.file_hash,
                file_size = excluded.file_size,
                complete = excluded.complete,
                last_processed = excluded.last_processed",
            params![
                checkpoint.filename,
                checkpoint.offset,
                checkpoint.lines_processed,
                checkpoint.file_hash,
                checkpoint.file_size,
                checkpoint.complete,
                now,
            ],
        )?;
        Ok(())
    }

    /// Delete rows repeating an earlier row's request key, keeping the first
    pub fn remove_duplicates(&self) -> DbResult<u64> {
        let sql = format!(
            "DELETE FROM logs WHERE id NOT IN (SELECT MIN(id) FROM logs GROUP BY {})",
            DUPLICATE_KEY
        );
        let deleted = self.tx.execute(&sql, [])?;
        Ok(deleted as u64)
    }

    /// Commit everything written in this transaction
    pub fn commit(self) -> DbResult<()> {
        self.tx.commit().map_err(DbError::from_sqlite)
    }

    /// Discard everything written in this transaction
    pub fn rollback(self) -> DbResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for storing access-log records and
//! per-file processing state, and provides functions to create and
//! configure the database.

use crate::error::{DbError, DbResult};
use rusqlite::Connection;

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 2;

/// SQL to create the log records table
/// Note: Using INTEGER PRIMARY KEY (without AUTOINCREMENT) for speed.
const CREATE_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY,
    timestamp TEXT NOT NULL,      -- Source format, e.g. 16/May/2025:00:06:10 +0000
    remote_addr TEXT NOT NULL,
    remote_user TEXT,             -- '-' when absent
    request_method TEXT,
    request_path TEXT,
    http_version TEXT,
    status INTEGER,
    bytes_sent INTEGER,
    referer TEXT,
    user_agent TEXT,
    processed_at TEXT             -- RFC 3339, set by the batch writer
)
"#;

/// SQL to create the file tracking table
const CREATE_PROCESSED_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS processed_files (
    filename TEXT PRIMARY KEY,    -- Absolute path
    last_offset INTEGER NOT NULL DEFAULT 0,
    lines_processed INTEGER NOT NULL DEFAULT 0,
    file_hash TEXT NOT NULL DEFAULT '',
    file_size INTEGER NOT NULL DEFAULT 0,
    complete INTEGER NOT NULL DEFAULT 0,
    last_processed TEXT
)
"#;

/// Columns every existing table must carry
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "logs",
        &[
            "id", "timestamp", "remote_addr", "remote_user", "request_method", "request_path",
            "http_version", "status", "bytes_sent", "referer", "user_agent", "processed_at",
        ],
    ),
    (
        "processed_files",
        &[
            "filename", "last_offset", "lines_processed", "file_hash", "file_size", "complete",
            "last_processed",
        ],
    ),
];

/// SQL to create ingest metadata table
const CREATE_INGEST_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// SQL to create indexes for common queries
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_logs_remote_addr ON logs(remote_addr)",
    "CREATE INDEX IF NOT EXISTS idx_logs_path ON logs(request_path) WHERE request_path != ''",
    "CREATE INDEX IF NOT EXISTS idx_logs_status ON logs(status)",
    "CREATE INDEX IF NOT EXISTS idx_logs_user_agent ON logs(user_agent)",
];

/// SQLite pragmas applied to every connection
///
/// WAL lets readers query while an ingest is running.
const CONNECTION_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA temp_store = MEMORY;
"#;

/// Create and configure the database
pub fn create_database(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(CONNECTION_PRAGMAS)?;

    conn.execute(CREATE_LOGS_TABLE, [])?;
    conn.execute(CREATE_PROCESSED_FILES_TABLE, [])?;
    conn.execute(CREATE_INGEST_INFO_TABLE, [])?;
    for (table, columns) in REQUIRED_COLUMNS {
        check_columns(conn, table, columns)?;
    }
    create_indexes(conn)?;

    match get_info(conn, keys::SCHEMA_VERSION)? {
        None => {
            set_info(conn, keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
        }
        Some(found) if found != SCHEMA_VERSION.to_string() => {
            return Err(DbError::Schema(format!(
                "database has schema version {}, expected {}",
                found, SCHEMA_VERSION
            )));
        }
        Some(_) => {}
    }
    set_info(conn, keys::TOOL_VERSION, env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

/// Fail if a pre-existing `table` lacks any of `columns`
fn check_columns(conn: &Connection, table: &str, columns: &[&str]) -> DbResult<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| !present.iter().any(|p| p == c))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    Err(DbError::Schema(format!(
        "table '{}' is missing column(s) {}; the database was created by an incompatible \
         version, ingest into a new database file",
        table,
        missing.join(", ")
    )))
}

/// Create indexes
pub fn create_indexes(conn: &Connection) -> DbResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Store ingest metadata
pub fn set_info(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ingest_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get ingest metadata
pub fn get_info(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM ingest_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Metadata keys stored in `ingest_info`
pub mod keys {
    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Version of the tool that last opened the database
    pub const TOOL_VERSION: &str = "tool_version";
}

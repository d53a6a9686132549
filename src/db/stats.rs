//! Database summary statistics for the `info` command

use crate::db::store::LogStore;
use crate::error::DbResult;

/// Number of status codes reported in the summary
const TOP_STATUS_LIMIT: usize = 5;

/// Summary of what has been ingested
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbStats {
    /// Total log records
    pub total_logs: u64,

    /// Tracked source files
    pub processed_files: u64,

    /// Lexically smallest raw timestamp
    pub earliest: Option<String>,

    /// Lexically largest raw timestamp
    pub latest: Option<String>,

    /// Most frequent status codes with counts, most frequent first
    pub top_status_codes: Vec<(u32, u64)>,

    /// Database file size in bytes (None for in-memory stores)
    pub database_size: Option<u64>,
}

/// Collect summary statistics
pub fn collect_stats(store: &LogStore) -> DbResult<DbStats> {
    let conn = store.connection();

    let (earliest, latest): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(timestamp), MAX(timestamp) FROM logs",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) AS count FROM logs
         GROUP BY status ORDER BY count DESC, status ASC LIMIT ?1",
    )?;
    let top_status_codes = stmt
        .query_map([TOP_STATUS_LIMIT as i64], |row| {
            Ok((row.get::<_, i64>(0)?.max(0) as u32, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let database_size = store
        .path()
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len());

    Ok(DbStats {
        total_logs: store.count_records()?,
        processed_files: store.count_files()?,
        earliest,
        latest,
        top_status_codes,
        database_size,
    })
}

impl LogStore {
    /// Summary statistics for this store
    pub fn stats(&self) -> DbResult<DbStats> {
        collect_stats(self)
    }
}

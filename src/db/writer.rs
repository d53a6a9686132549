//! Batched record writer
//!
//! Buffers parsed records in memory and flushes them to SQLite as one bulk
//! insert per batch.
//!
//! # Performance Characteristics
//!
//! - Batched inserts inside a single transaction (1K records per batch default)
//! - Prepared, cached insert statement
//! - Buffer capacity is fixed at the batch size; records are dropped after
//!   every flush so memory stays bounded for arbitrarily large files

use crate::db::store::{LogStore, StoreTransaction};
use crate::error::DbResult;
use crate::parser::LogRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

/// Statistics about write operations
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    /// Records accepted by storage
    pub records_written: u64,

    /// Batches flushed
    pub batches_flushed: u64,

    /// Batches where storage accepted fewer rows than submitted
    pub short_batches: u64,
}

/// Produces `processed_at` stamps that never go backwards within a run
#[derive(Debug, Default)]
struct IngestClock {
    last: Option<DateTime<Utc>>,
}

impl IngestClock {
    fn stamp(&mut self) -> String {
        let now = Utc::now();
        let stamp = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(stamp);
        stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Buffers records and flushes them in bounded transactional batches
#[derive(Debug)]
pub struct BatchWriter {
    batch_size: usize,
    buffer: Vec<LogRecord>,
    clock: IngestClock,
    stats: WriterStats,
}

impl BatchWriter {
    /// Create a writer flushing every `batch_size` records
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            clock: IngestClock::default(),
            stats: WriterStats::default(),
        }
    }

    /// Configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Buffer a record; returns true when the batch is full
    pub fn push(&mut self, record: LogRecord) -> bool {
        self.buffer.push(record);
        self.is_full()
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True once the buffer holds a full batch
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.batch_size
    }

    /// Writer statistics
    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Insert buffered records inside `tx` and release them
    ///
    /// The caller commits `tx`; if it is dropped instead, nothing in this
    /// batch persists. Returns the number of rows storage accepted.
    pub fn flush(&mut self, tx: &StoreTransaction<'_>) -> DbResult<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let submitted = self.buffer.len();
        let processed_at = self.clock.stamp();
        let accepted = tx.insert_records(&self.buffer, &processed_at)?;

        if accepted != submitted {
            warn!(submitted, accepted, "Not all records were inserted");
            self.stats.short_batches += 1;
        }

        self.buffer.clear();
        self.stats.records_written += accepted as u64;
        self.stats.batches_flushed += 1;
        debug!(records = accepted, "Flushed batch");

        Ok(accepted)
    }

    /// Write a lazy sequence of records, one transaction per batch
    ///
    /// Returns the total number of rows accepted by storage.
    pub fn write_all<I>(&mut self, store: &mut LogStore, records: I) -> DbResult<u64>
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut total = 0u64;
        for record in records {
            if self.push(record) {
                total += self.flush_committed(store)? as u64;
            }
        }
        total += self.flush_committed(store)? as u64;
        Ok(total)
    }

    fn flush_committed(&mut self, store: &mut LogStore) -> DbResult<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let tx = store.transaction()?;
        let accepted = self.flush(&tx)?;
        tx.commit()?;
        Ok(accepted)
    }
}

//! Database module for SQLite storage
//!
//! This module provides the storage side of the ingestion pipeline:
//! - `logs`: one row per parsed request
//! - `processed_files`: one row per source file with its resume checkpoint
//!
//! Read-only reports and duplicate detection live in [`queries`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Ingest Coordinator                     │
//! │  - Pushes parsed records                            │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ LogRecord
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 BatchWriter                         │
//! │  - Buffers up to batch_size records                 │
//! │  - Flushes inside a StoreTransaction                │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ INSERT logs + UPSERT processed_files
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │              SQLite (WAL mode)                      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod queries;
pub mod schema;
pub mod stats;
pub mod store;
pub mod writer;

pub use queries::{count_duplicates, overview, run_report, Overview, Report, ReportTable};
pub use schema::{create_database, create_indexes, keys};
pub use stats::{collect_stats, DbStats};
pub use store::{FileCheckpoint, FileState, LogStore, StoreTransaction, DEFAULT_BUSY_TIMEOUT};
pub use writer::{BatchWriter, WriterStats};

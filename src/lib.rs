//! nginx-sqlize - nginx access logs into SQLite
//!
//! Parses access logs in Combined Log Format and loads them into a SQLite
//! database for ad-hoc querying. Per-file processing state lives next to the
//! data, so ingestion is idempotent and resumable.
//!
//! # Features
//!
//! - **Incremental**: unchanged files are skipped, appended lines are picked
//!   up from the last committed offset, rotated files start over.
//!
//! - **Atomic checkpoints**: every batch of records is committed in the same
//!   transaction as the file offset that covers it.
//!
//! - **Bounded memory**: records are buffered one batch at a time, whatever
//!   the file size.
//!
//! - **Compressed input**: `.gz` files are decompressed on the fly.
//!
//! - **Reports**: built-in traffic, error and security reports, with CSV
//!   export and duplicate cleanup.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   Log files (glob)   │  discovery: mtime order
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │   Change Detector    │◄────►│   processed_files    │
//! │  MD5 of first 8 KiB  │      │  offset, lines, hash │
//! └──────────┬───────────┘      └──────────▲───────────┘
//!            │ resume offset               │
//!            ▼                             │ checkpoint
//! ┌──────────────────────┐                 │ (same tx)
//! │  Ingest Coordinator  │                 │
//! │  LogReader → Parser  │                 │
//! └──────────┬───────────┘                 │
//!            │ LogRecord                   │
//!            ▼                             │
//! ┌──────────────────────┐      ┌──────────┴───────────┐
//! │     BatchWriter      │─────►│        logs          │
//! │  1K records/batch    │      │   SQLite (WAL mode)  │
//! └──────────────────────┘      └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Load the current and rotated logs
//! nginx-sqlize ingest --logs '/var/log/nginx/access.log*' --db nginx_logs.db
//!
//! # Built-in reports
//! nginx-sqlize query ips -n 20
//!
//! # Or plain SQL
//! sqlite3 nginx_logs.db "SELECT status, COUNT(*) FROM logs GROUP BY status"
//! ```

pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod ingest;
pub mod parser;
pub mod progress;

pub use config::{CliArgs, Command, IngestArgs, IngestConfig};
pub use db::{collect_stats, run_report, DbStats, LogStore, Report, ReportTable};
pub use error::{DbError, FileOutcome, IngestError, Result};
pub use ingest::{find_log_files, IngestCoordinator, IngestOptions, IngestReport, RunSummary};
pub use parser::{parse_line, LogRecord, ParseOutcome};

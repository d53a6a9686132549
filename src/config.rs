//! Configuration types for nginx-sqlize
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::db::Report;
use crate::error::ConfigError;
use crate::ingest::IngestOptions;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 100;
const MAX_BATCH_SIZE: usize = 100_000;

/// Largest row count a top-N report may ask for
const MAX_REPORT_LIMIT: i64 = 10_000;

/// Minimum wait for the database write lock
const MIN_BUSY_TIMEOUT_SECS: u64 = 1;

/// Default database file
pub const DEFAULT_DB_PATH: &str = "nginx_logs.db";

/// Load nginx access logs into SQLite
#[derive(Parser, Debug, Clone)]
#[command(
    name = "nginx-sqlize",
    version,
    about = "Load nginx access logs into a SQLite database",
    long_about = "Parses nginx access logs in Combined Log Format and loads them into SQLite.\n\n\
                  Each file's progress is checkpointed in the database, so re-runs skip\n\
                  unchanged files, pick up appended lines, and resume interrupted runs.\n\
                  Files ending in .gz are decompressed transparently.",
    after_help = "EXAMPLES:\n    \
        nginx-sqlize ingest --logs '/var/log/nginx/access.log*'\n    \
        nginx-sqlize ingest --logs 'logs/**/*.gz' --db archive.db --batch-size 5000\n    \
        nginx-sqlize ingest --logs access.log --force -v\n    \
        nginx-sqlize info --db nginx_logs.db --status\n    \
        nginx-sqlize query ips -n 20\n    \
        nginx-sqlize query threats --csv threats.csv\n    \
        nginx-sqlize dedupe --dry-run"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Also write a daily-rotated log file into this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Ingest log files into the database
    Ingest(IngestArgs),

    /// Show database information
    Info {
        /// SQLite database file
        #[arg(long, value_name = "FILE")]
        db: PathBuf,

        /// Show record counts, date range and top status codes
        #[arg(long)]
        status: bool,
    },

    /// Run a report over the ingested logs
    Query {
        /// Report to run
        #[arg(value_enum, default_value_t = Report::Overview)]
        report: Report,

        /// SQLite database file
        #[arg(long, default_value = DEFAULT_DB_PATH, value_name = "FILE")]
        db: PathBuf,

        /// Rows shown by top-N reports
        #[arg(
            short = 'n',
            long,
            default_value = "10",
            value_name = "NUM",
            value_parser = clap::value_parser!(u32).range(1..=MAX_REPORT_LIMIT)
        )]
        limit: u32,

        /// Write the report as CSV to this file instead of printing it
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },

    /// Find and remove duplicate log records
    Dedupe {
        /// SQLite database file
        #[arg(long, default_value = DEFAULT_DB_PATH, value_name = "FILE")]
        db: PathBuf,

        /// Only count duplicates
        #[arg(long)]
        dry_run: bool,

        /// Reclaim free space afterwards
        #[arg(long)]
        vacuum: bool,
    },
}

/// Arguments for `ingest`
#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Log file path or glob pattern (e.g. /var/log/nginx/*.log)
    #[arg(long, value_name = "GLOB")]
    pub logs: String,

    /// SQLite database file
    #[arg(long, default_value = DEFAULT_DB_PATH, value_name = "FILE")]
    pub db: PathBuf,

    /// Records per insert transaction
    #[arg(short = 'b', long, default_value = "1000", value_name = "NUM")]
    pub batch_size: usize,

    /// Reprocess files even if they were processed before
    #[arg(long)]
    pub force: bool,

    /// Seconds to wait for the database write lock
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub busy_timeout: u64,
}

/// Validated configuration for an ingest run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Log path or glob
    pub logs_pattern: String,

    /// Database path
    pub db_path: PathBuf,

    /// Records per transaction
    pub batch_size: usize,

    /// Ignore stored file state
    pub force: bool,

    /// Write lock wait
    pub busy_timeout: Duration,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl IngestConfig {
    /// Create and validate configuration from `ingest` arguments
    pub fn from_args(args: &IngestArgs, quiet: bool, verbose: bool) -> Result<Self, ConfigError> {
        if args.logs.trim().is_empty() {
            return Err(ConfigError::InvalidPattern {
                pattern: args.logs.clone(),
                reason: "pattern is empty".to_string(),
            });
        }

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&args.batch_size) {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        if args.busy_timeout < MIN_BUSY_TIMEOUT_SECS {
            return Err(ConfigError::InvalidBusyTimeout {
                secs: args.busy_timeout,
                min: MIN_BUSY_TIMEOUT_SECS,
            });
        }

        if args.db.is_dir() {
            return Err(ConfigError::InvalidDbPath {
                path: args.db.clone(),
                reason: "path is a directory".to_string(),
            });
        }

        Ok(Self {
            logs_pattern: args.logs.clone(),
            db_path: args.db.clone(),
            batch_size: args.batch_size,
            force: args.force,
            busy_timeout: Duration::from_secs(args.busy_timeout),
            show_progress: !quiet,
            verbose,
        })
    }

    /// Coordinator options for this run
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            batch_size: self.batch_size,
            force: self.force,
        }
    }
}

//! nginx-sqlize - nginx access logs into SQLite
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use nginx_sqlize::config::{CliArgs, Command, IngestConfig};
use nginx_sqlize::db::{
    collect_stats, count_duplicates, run_report, LogStore, Report, DEFAULT_BUSY_TIMEOUT,
};
use nginx_sqlize::ingest::{find_log_files, IngestCoordinator};
use nginx_sqlize::progress::{
    print_db_info, print_dedupe, print_header, print_report, print_summary, ProgressReporter,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix for the rolling log
const LOG_FILE_PREFIX: &str = "nginx-sqlize.log";

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command fully succeeded
fn run() -> Result<bool> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging; the guard flushes the file log on exit
    let _guard = setup_logging(args.verbose, args.log_dir.as_deref())?;

    match &args.command {
        Command::Ingest(ingest) => {
            let config = IngestConfig::from_args(ingest, args.quiet, args.verbose)
                .context("Invalid configuration")?;
            run_ingest(config)
        }
        Command::Info { db, status } => run_info(db, *status),
        Command::Query {
            report,
            db,
            limit,
            csv,
        } => run_query(db, *report, *limit, csv.as_deref()),
        Command::Dedupe {
            db,
            dry_run,
            vacuum,
        } => run_dedupe(db, *dry_run, *vacuum),
    }
}

fn run_ingest(config: IngestConfig) -> Result<bool> {
    let files = find_log_files(&config.logs_pattern).context("Invalid log pattern")?;
    if files.is_empty() {
        eprintln!("No log files found matching: {}", config.logs_pattern);
        return Ok(false);
    }
    info!(count = files.len(), "Found log files to process");

    let db_display = std::path::absolute(&config.db_path)
        .unwrap_or_else(|_| config.db_path.clone())
        .display()
        .to_string();

    if config.show_progress {
        print_header(&config.logs_pattern, files.len(), &db_display);
    }

    let store = LogStore::open(&config.db_path, config.busy_timeout)
        .with_context(|| format!("Failed to open database {}", db_display))?;

    let progress = if config.show_progress {
        ProgressReporter::new()
    } else {
        ProgressReporter::hidden()
    };
    progress.set_status("Starting ingest...");

    let mut coordinator =
        IngestCoordinator::new(store, config.ingest_options()).with_progress(progress.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping after the current batch...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let summary = coordinator.run(&files);

    if summary.completed {
        progress.finish("Ingest completed");
    } else {
        progress.finish("Ingest interrupted");
    }

    let store = coordinator.into_store();
    let total_records = store.count_records().context("Failed to count records")?;
    let db_size = std::fs::metadata(&config.db_path).ok().map(|m| m.len());

    print_summary(&summary, files.len(), total_records, &db_display, db_size);

    if !summary.completed {
        info!("Ingest was interrupted; the next run resumes from the last checkpoint");
    }
    if summary.files_failed > 0 {
        warn!(failed = summary.files_failed, "Ingest completed with failures");
    }

    Ok(summary.is_success())
}

fn run_info(db: &Path, status: bool) -> Result<bool> {
    let store = open_existing(db)?;
    let stats = collect_stats(&store).context("Failed to collect statistics")?;
    print_db_info(&display_path(db), &stats, status);

    Ok(true)
}

fn run_query(db: &Path, report: Report, limit: u32, csv: Option<&Path>) -> Result<bool> {
    let store = open_existing(db)?;
    let table = run_report(&store, report, limit)
        .with_context(|| format!("Failed to run {} report", report.title()))?;

    match csv {
        Some(out) => {
            let file = File::create(out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            table
                .write_csv(BufWriter::new(file))
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(rows = table.rows.len(), path = %out.display(), "Report exported");
            println!("Wrote {} rows to {}", table.rows.len(), out.display());
        }
        None => print_report(report, &table),
    }

    Ok(true)
}

fn run_dedupe(db: &Path, dry_run: bool, vacuum: bool) -> Result<bool> {
    let mut store = open_existing(db)?;
    let duplicates = count_duplicates(&store).context("Failed to count duplicates")?;

    let removed = if dry_run || duplicates == 0 {
        None
    } else {
        let tx = store.transaction().context("Failed to start transaction")?;
        let removed = tx.remove_duplicates().context("Failed to remove duplicates")?;
        tx.commit().context("Failed to commit duplicate removal")?;
        info!(removed, "Removed duplicate records");
        Some(removed)
    };

    if vacuum && !dry_run {
        store.vacuum().context("Failed to vacuum database")?;
    }

    let remaining = store.count_records().context("Failed to count records")?;
    print_dedupe(&display_path(db), duplicates, removed, remaining);

    Ok(true)
}

/// Open a database that must already exist
fn open_existing(db: &Path) -> Result<LogStore> {
    if !db.is_file() {
        bail!("Database file not found: {}", db.display());
    }
    LogStore::open(db, DEFAULT_BUSY_TIMEOUT)
        .with_context(|| format!("Failed to open database {}", db.display()))
}

fn display_path(db: &Path) -> String {
    std::fs::canonicalize(db)
        .unwrap_or_else(|_| db.to_path_buf())
        .display()
        .to_string()
}

/// Setup logging with tracing
fn setup_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("nginx_sqlize=debug,warn")
    } else {
        EnvFilter::new("nginx_sqlize=info,warn")
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

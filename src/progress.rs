//! Progress reporting for ingest runs
//!
//! Provides real-time progress display using indicatif spinners, plus the
//! console output of the `info`, `query` and `dedupe` commands.

use crate::db::{DbStats, Report, ReportTable};
use crate::ingest::{IngestProgress, RunSummary};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress reporter that displays ingest status
#[derive(Clone)]
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update the progress display
    pub fn update(&self, progress: &IngestProgress) {
        let name = Path::new(&progress.current)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| progress.current.clone());

        let msg = format!(
            "File {}/{}: {} | Lines: {} | Records: {} | Rate: {:.0}/s",
            progress.files_done + 1,
            progress.files_total,
            name,
            format_number(progress.lines),
            format_number(progress.records),
            progress.lines_per_second(),
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the ingest run
pub fn print_summary(
    summary: &RunSummary,
    files_found: usize,
    total_records: u64,
    db_path: &str,
    db_size: Option<u64>,
) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.lines_read as f64 / duration_secs
    } else {
        0.0
    };

    let title = if summary.completed {
        style("Ingest Complete").green().bold()
    } else {
        style("Ingest Interrupted").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}/{} ({} skipped)",
        style("Files processed:").bold(),
        format_number(summary.files_processed),
        files_found,
        format_number(summary.files_skipped)
    );
    println!("  {} {}", style("Lines read:").bold(), format_number(summary.lines_read));
    println!(
        "  {} {}",
        style("Records inserted:").bold(),
        format_number(summary.records_inserted)
    );
    if summary.parse_errors > 0 {
        println!(
            "  {} {}",
            style("Parse errors:").yellow().bold(),
            format_number(summary.parse_errors)
        );
    }
    if summary.files_failed > 0 {
        println!(
            "  {} {}",
            style("Files failed:").red().bold(),
            format_number(summary.files_failed)
        );
    }
    println!(
        "  {} {:.1}s ({:.0} lines/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    println!("  {} {}", style("Total records:").bold(), format_number(total_records));
    print_db_location(db_path, db_size);
    println!();
}

/// Print a header at the start of the run
pub fn print_header(pattern: &str, files: usize, db_path: &str) {
    println!();
    println!(
        "{} {}",
        style("nginx-sqlize").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Logs:").bold(), pattern);
    println!("  {} {}", style("Files found:").bold(), files);
    println!("  {} {}", style("Database:").bold(), db_path);
    println!();
}

/// Print database information for the `info` command
pub fn print_db_info(db_path: &str, stats: &DbStats, detailed: bool) {
    println!();
    println!("{}", style("Database").cyan().bold());
    println!("{}", style("─".repeat(50)).dim());
    print_db_location(db_path, stats.database_size);

    if detailed {
        println!("  {} {}", style("Log records:").bold(), format_number(stats.total_logs));
        println!(
            "  {} {}",
            style("Processed files:").bold(),
            format_number(stats.processed_files)
        );
        if let (Some(earliest), Some(latest)) = (&stats.earliest, &stats.latest) {
            println!("  {} {}", style("Earliest:").bold(), earliest);
            println!("  {} {}", style("Latest:").bold(), latest);
        }
        if !stats.top_status_codes.is_empty() {
            println!("  {}", style("Top status codes:").bold());
            for (status, count) in &stats.top_status_codes {
                println!("    {:>3}  {}", status, format_number(*count));
            }
        }
    }
    println!();
}

/// Print a report as a table
pub fn print_report(report: Report, table: &ReportTable) {
    println!();
    println!("{}", style(report.title()).cyan().bold());
    if table.is_empty() {
        println!("  {}", style("No matching records").dim());
        println!();
        return;
    }
    print!("{}", render_report(table));
    println!();
}

fn render_report(table: &ReportTable) -> String {
    let mut out = Table::new();
    out.load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(&table.columns);
    for row in &table.rows {
        out.add_row(row);
    }
    format!("{}\n", out)
}

/// Print the outcome of a duplicate scan or removal
pub fn print_dedupe(db_path: &str, duplicates: u64, removed: Option<u64>, remaining: u64) {
    println!();
    println!("{}", style("Duplicates").cyan().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Database:").bold(), db_path);
    println!("  {} {}", style("Duplicate records:").bold(), format_number(duplicates));
    match removed {
        Some(n) => println!("  {} {}", style("Removed:").green().bold(), format_number(n)),
        None if duplicates > 0 => println!(
            "  {}",
            style("Dry run, nothing removed").yellow()
        ),
        None => {}
    }
    println!("  {} {}", style("Total records:").bold(), format_number(remaining));
    println!();
}

fn print_db_location(db_path: &str, db_size: Option<u64>) {
    if let Some(size) = db_size {
        let db_size_str = format_size(size, BINARY);
        println!("  {} {} ({})", style("Database:").bold(), db_path, db_size_str);
    } else {
        println!("  {} {}", style("Database:").bold(), db_path);
    }
}

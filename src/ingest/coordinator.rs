//! Ingest coordinator - drives files through the pipeline
//!
//! The coordinator is responsible for:
//! - Asking the change detector whether a file needs work
//! - Streaming lines from the resume offset through the parser
//! - Committing each batch together with its file checkpoint
//! - Honoring the shutdown flag between batches
//! - Per-run statistics
//!
//! Per file the pipeline moves through
//! `Pending -> (Skipped | Reading -> Flushing* -> Finalizing -> Done)`.
//! A failure is reported with the stage it happened in.

use crate::content::LogReader;
use crate::db::{BatchWriter, FileCheckpoint, LogStore};
use crate::error::{FileOutcome, IngestError, Result};
use crate::ingest::detector::{should_process, Decision, DecisionReason};
use crate::parser::{parse_line, ParseOutcome};
use crate::progress::ProgressReporter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, trace, warn};

/// Default records per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Stage of a single file's run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileStage {
    /// Change detection and opening
    #[default]
    Pending,
    /// Nothing to do
    Skipped,
    Reading,
    /// Committing a full batch with a partial checkpoint
    Flushing,
    /// Committing the remainder with the completed checkpoint
    Finalizing,
    Done,
}

/// Per-run options
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Records per transactional batch
    pub batch_size: usize,

    /// Ignore stored state and reprocess from offset 0
    pub force: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            force: false,
        }
    }
}

/// What one file's run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Lines read this run, including blank and malformed ones
    pub lines_read: u64,

    /// Records committed this run
    pub records_inserted: u64,

    /// Non-blank lines that did not match the grammar
    pub parse_errors: u64,

    /// Record batches committed
    pub batches: u64,

    /// Last stage reached
    pub stage: FileStage,
}

impl IngestReport {
    /// True if the change detector found nothing to do
    pub fn is_skipped(&self) -> bool {
        self.stage == FileStage::Skipped
    }
}

/// Totals for a batch run over many files
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files_processed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub files_interrupted: u64,
    pub lines_read: u64,
    pub records_inserted: u64,
    pub parse_errors: u64,

    /// Wall time for the run
    pub duration: Duration,

    /// False if the run stopped on the shutdown flag
    pub completed: bool,
}

impl RunSummary {
    /// True if every file was processed or skipped
    pub fn is_success(&self) -> bool {
        self.completed && self.files_failed == 0 && self.files_interrupted == 0
    }

    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Processed {
                lines_read,
                records_inserted,
                parse_errors,
                ..
            } => {
                self.files_processed += 1;
                self.lines_read += lines_read;
                self.records_inserted += records_inserted;
                self.parse_errors += parse_errors;
            }
            FileOutcome::Skipped { .. } => self.files_skipped += 1,
            FileOutcome::Interrupted {
                lines_read,
                records_inserted,
                parse_errors,
                ..
            } => {
                self.files_interrupted += 1;
                self.lines_read += lines_read;
                self.records_inserted += records_inserted;
                self.parse_errors += parse_errors;
            }
            FileOutcome::Failed { .. } => self.files_failed += 1,
        }
    }
}

/// Progress snapshot for display
#[derive(Debug, Clone)]
pub struct IngestProgress {
    /// Files finished so far
    pub files_done: usize,

    /// Files in this run
    pub files_total: usize,

    /// File currently being read
    pub current: String,

    /// Lines read across the run
    pub lines: u64,

    /// Records committed across the run
    pub records: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

impl IngestProgress {
    /// Lines per second across the run
    pub fn lines_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.lines as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives log files through parsing and storage
pub struct IngestCoordinator {
    /// Storage handle, owned for the coordinator's lifetime
    store: LogStore,

    /// Run options
    options: IngestOptions,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,

    /// Progress display, hidden unless attached
    progress: ProgressReporter,
}

impl IngestCoordinator {
    /// Create a coordinator over an open store
    pub fn new(store: LogStore, options: IngestOptions) -> Self {
        Self {
            store,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
            progress: ProgressReporter::hidden(),
        }
    }

    /// Attach a progress display
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Storage handle
    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Release the storage handle
    pub fn into_store(self) -> LogStore {
        self.store
    }

    /// Ingest one file end to end
    ///
    /// Returns [`IngestError::Interrupted`] if the shutdown flag was raised;
    /// everything up to the last checkpoint stays committed.
    pub fn ingest_file(&mut self, path: &Path) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        self.ingest_into(path, &mut report, None)?;
        Ok(report)
    }

    /// Ingest one file, folding any error into the outcome
    pub fn process_file(&mut self, path: &Path) -> FileOutcome {
        self.process_tracked(path, None)
    }

    /// Ingest files in order, continuing past per-file failures
    pub fn run(&mut self, paths: &[PathBuf]) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary {
            completed: true,
            ..Default::default()
        };

        info!(files = paths.len(), force = self.options.force, "Starting ingest run");

        for (index, path) in paths.iter().enumerate() {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received");
                summary.completed = false;
                break;
            }

            let tracker = RunTracker {
                files_done: index,
                files_total: paths.len(),
                lines_before: summary.lines_read,
                records_before: summary.records_inserted,
                start,
            };
            let outcome = self.process_tracked(path, Some(&tracker));

            match &outcome {
                FileOutcome::Processed {
                    path,
                    lines_read,
                    records_inserted,
                    parse_errors,
                } => info!(
                    path = %path,
                    lines = lines_read,
                    inserted = records_inserted,
                    parse_errors = parse_errors,
                    "Processed file"
                ),
                FileOutcome::Skipped { path, reason } => {
                    debug!(path = %path, reason = %reason, "Skipped file")
                }
                FileOutcome::Interrupted { path, .. } => {
                    warn!(path = %path, "Interrupted, progress saved at last checkpoint");
                    summary.completed = false;
                }
                FileOutcome::Failed { path, stage, error } => {
                    warn!(path = %path, stage = ?stage, error = %error, "Failed to process file")
                }
            }

            summary.record(&outcome);
            if !summary.completed {
                break;
            }
        }

        summary.duration = start.elapsed();
        info!(
            processed = summary.files_processed,
            skipped = summary.files_skipped,
            failed = summary.files_failed,
            records = summary.records_inserted,
            duration_secs = summary.duration.as_secs(),
            "Ingest run finished"
        );
        summary
    }

    fn process_tracked(&mut self, path: &Path, tracker: Option<&RunTracker>) -> FileOutcome {
        let display = path.display().to_string();
        let mut report = IngestReport::default();

        match self.ingest_into(path, &mut report, tracker) {
            Ok(()) if report.is_skipped() => FileOutcome::Skipped {
                path: display,
                reason: DecisionReason::Unchanged.to_string(),
            },
            Ok(()) => FileOutcome::Processed {
                path: display,
                lines_read: report.lines_read,
                records_inserted: report.records_inserted,
                parse_errors: report.parse_errors,
            },
            Err(IngestError::Interrupted) => FileOutcome::Interrupted {
                path: display,
                lines_read: report.lines_read,
                records_inserted: report.records_inserted,
                parse_errors: report.parse_errors,
            },
            Err(error) => FileOutcome::Failed {
                path: display,
                stage: report.stage,
                error,
            },
        }
    }

    fn ingest_into(
        &mut self,
        path: &Path,
        report: &mut IngestReport,
        tracker: Option<&RunTracker>,
    ) -> Result<()> {
        let path = resolve_path(path)?;
        let filename = path.to_string_lossy().into_owned();
        let span = info_span!("ingest", path = %filename);
        let _enter = span.enter();

        report.stage = FileStage::Pending;
        let decision = should_process(&self.store, &path, self.options.force)?;
        if !decision.process {
            advance(&mut report.stage, FileStage::Skipped);
            return Ok(());
        }

        let result = self.stream(&path, &filename, &decision, report, tracker);
        match &result {
            Ok(()) => {}
            Err(IngestError::Interrupted) => {
                debug!(stage = ?report.stage, "Stopped between batches");
            }
            Err(e) => {
                warn!(stage = ?report.stage, error = %e, "Run failed, in-flight batch rolled back");
            }
        }
        result
    }

    fn stream(
        &mut self,
        path: &Path,
        filename: &str,
        decision: &Decision,
        report: &mut IngestReport,
        tracker: Option<&RunTracker>,
    ) -> Result<()> {
        let mut reader = LogReader::open(path, decision.resume_offset)?;
        advance(&mut report.stage, FileStage::Reading);

        let mut writer = BatchWriter::new(self.options.batch_size);

        while let Some(line) = reader.next_line()? {
            report.lines_read += 1;

            match parse_line(&line) {
                ParseOutcome::Record(record) => {
                    if !writer.push(record) {
                        continue;
                    }

                    advance(&mut report.stage, FileStage::Flushing);
                    let cp = checkpoint(filename, decision, reader.offset(), report.lines_read, false);
                    report.records_inserted += self.commit_batch(&mut writer, &cp)? as u64;
                    report.batches = writer.stats().batches_flushed;
                    advance(&mut report.stage, FileStage::Reading);

                    if let Some(tracker) = tracker {
                        self.progress.update(&tracker.snapshot(filename, report));
                    }

                    if self.shutdown.load(Ordering::Relaxed) {
                        return Err(IngestError::Interrupted);
                    }
                }
                ParseOutcome::Blank => {}
                ParseOutcome::Miss => {
                    report.parse_errors += 1;
                    debug!(line = report.lines_read, "Line did not match log format");
                }
            }
        }

        if reader.held_back() > 0 {
            debug!(
                bytes = reader.held_back(),
                offset = reader.offset(),
                "Unterminated last line left for the next run"
            );
        }

        advance(&mut report.stage, FileStage::Finalizing);
        let cp = checkpoint(filename, decision, reader.offset(), report.lines_read, true);
        report.records_inserted += self.commit_batch(&mut writer, &cp)? as u64;
        advance(&mut report.stage, FileStage::Done);

        let stats = writer.stats();
        report.batches = stats.batches_flushed;
        debug!(
            batches = stats.batches_flushed,
            short_batches = stats.short_batches,
            records = stats.records_written,
            "File committed"
        );

        if let Some(tracker) = tracker {
            self.progress.update(&tracker.snapshot(filename, report));
        }
        Ok(())
    }

    /// One transaction: buffered records plus the checkpoint covering them
    fn commit_batch(&mut self, writer: &mut BatchWriter, cp: &FileCheckpoint<'_>) -> Result<usize> {
        let tx = self.store.transaction()?;
        let inserted = writer.flush(&tx)?;
        tx.upsert_file_state(cp)?;
        tx.commit()?;
        trace!(offset = cp.offset, complete = cp.complete, "Checkpoint committed");
        Ok(inserted)
    }
}

/// Run-level counters needed to render progress mid-file
struct RunTracker {
    files_done: usize,
    files_total: usize,
    lines_before: u64,
    records_before: u64,
    start: Instant,
}

impl RunTracker {
    fn snapshot(&self, current: &str, report: &IngestReport) -> IngestProgress {
        IngestProgress {
            files_done: self.files_done,
            files_total: self.files_total,
            current: current.to_string(),
            lines: self.lines_before + report.lines_read,
            records: self.records_before + report.records_inserted,
            elapsed: self.start.elapsed(),
        }
    }
}

fn advance(stage: &mut FileStage, next: FileStage) {
    trace!(from = ?*stage, to = ?next, "Stage transition");
    *stage = next;
}

fn checkpoint<'a>(
    filename: &'a str,
    decision: &'a Decision,
    offset: u64,
    lines_this_run: u64,
    complete: bool,
) -> FileCheckpoint<'a> {
    FileCheckpoint {
        filename,
        offset,
        lines_processed: decision.resume_lines + lines_this_run,
        file_hash: &decision.fingerprint.hash,
        file_size: decision.fingerprint.file_size,
        complete,
    }
}

/// Absolute tracking key for a path
///
/// Symlinks are resolved when the file exists; a missing file keeps its
/// absolute spelling so the open failure is reported against it.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(p) => Ok(p),
        Err(_) => Ok(std::path::absolute(path)?),
    }
}

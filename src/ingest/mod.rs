//! Ingestion pipeline
//!
//! - `discovery`: expand a glob into input files, oldest first
//! - `detector`: decide per file whether to (re)process and from where
//! - `coordinator`: stream one file through parser and writer with
//!   transactional checkpoints

pub mod coordinator;
pub mod detector;
pub mod discovery;

pub use coordinator::{
    FileStage, IngestCoordinator, IngestOptions, IngestProgress, IngestReport, RunSummary,
    DEFAULT_BATCH_SIZE,
};
pub use detector::{decide, should_process, Decision, DecisionReason};
pub use discovery::find_log_files;

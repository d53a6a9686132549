//! Change detection for source files
//!
//! Decides whether a file needs (re)processing and from which byte offset,
//! by comparing a fresh [`Fingerprint`] against the stored [`FileState`].
//!
//! A differing fingerprint means the head of the file changed. A stored
//! offset is only trusted again if the old head is provably still a prefix
//! of the file (pure append to a file smaller than the sample); otherwise
//! the file was rotated or rewritten and processing restarts at offset 0.

use crate::content::{fingerprint_file, hash_prefix, Fingerprint, SAMPLE_SIZE};
use crate::db::{FileState, LogStore};
use crate::error::DbResult;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Why the detector reached its decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// Force flag set
    Forced,
    /// No stored state
    New,
    /// Fingerprint could not be computed
    Unverifiable,
    /// Same head, previous run stopped at a checkpoint or file grew
    Resume,
    /// Head changed only by appending to a short file
    Appended,
    /// Head rewritten, truncated or rotated
    Rewritten,
    /// Same head, same size, previous run complete
    Unchanged,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionReason::Forced => "forced reprocess",
            DecisionReason::New => "not seen before",
            DecisionReason::Unverifiable => "fingerprint unavailable",
            DecisionReason::Resume => "resuming from checkpoint",
            DecisionReason::Appended => "appended since last run",
            DecisionReason::Rewritten => "rotated or rewritten",
            DecisionReason::Unchanged => "unchanged since last run",
        };
        f.write_str(s)
    }
}

/// Outcome of change detection for one file
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the coordinator should run
    pub process: bool,

    /// Byte offset to start reading from
    pub resume_offset: u64,

    /// Lines already covered below `resume_offset`
    pub resume_lines: u64,

    /// Why
    pub reason: DecisionReason,

    /// Fingerprint taken for this decision, stored on commit
    pub fingerprint: Fingerprint,
}

impl Decision {
    fn from_start(reason: DecisionReason, fingerprint: Fingerprint) -> Self {
        Self {
            process: true,
            resume_offset: 0,
            resume_lines: 0,
            reason,
            fingerprint,
        }
    }

    fn resume(reason: DecisionReason, prior: &FileState, fingerprint: Fingerprint) -> Self {
        Self {
            process: true,
            resume_offset: prior.last_offset,
            resume_lines: prior.lines_processed,
            reason,
            fingerprint,
        }
    }

    fn skip(prior: &FileState, fingerprint: Fingerprint) -> Self {
        Self {
            process: false,
            resume_offset: prior.last_offset,
            resume_lines: prior.lines_processed,
            reason: DecisionReason::Unchanged,
            fingerprint,
        }
    }
}

/// Look up stored state for `path` and decide whether to process it
///
/// `path` must already be absolute; it is the tracking key.
pub fn should_process(store: &LogStore, path: &Path, force: bool) -> DbResult<Decision> {
    let current = fingerprint_file(path);
    let filename = path.to_string_lossy();
    let prior = if force {
        None
    } else {
        store.get_file_state(&filename)?
    };

    let decision = decide(path, prior.as_ref(), current, force);
    match decision.reason {
        DecisionReason::Unchanged => info!(
            path = %path.display(),
            lines = decision.resume_lines,
            "Skipping file, already in database"
        ),
        DecisionReason::Rewritten => info!(
            path = %path.display(),
            "File head changed since last processing, starting from offset 0"
        ),
        reason => debug!(
            path = %path.display(),
            offset = decision.resume_offset,
            %reason,
            "Processing file"
        ),
    }
    Ok(decision)
}

/// Pure decision over a prior state and a fresh fingerprint
pub fn decide(
    path: &Path,
    prior: Option<&FileState>,
    current: Fingerprint,
    force: bool,
) -> Decision {
    if force {
        return Decision::from_start(DecisionReason::Forced, current);
    }

    let Some(prior) = prior else {
        return Decision::from_start(DecisionReason::New, current);
    };

    if current.is_empty() {
        return Decision::from_start(DecisionReason::Unverifiable, current);
    }

    if current.hash == prior.file_hash {
        if current.file_size < prior.file_size {
            return Decision::from_start(DecisionReason::Rewritten, current);
        }
        if prior.complete && current.file_size == prior.file_size {
            return Decision::skip(prior, current);
        }
        return Decision::resume(DecisionReason::Resume, prior, current);
    }

    if head_extends(path, prior, &current) {
        return Decision::resume(DecisionReason::Appended, prior, current);
    }

    Decision::from_start(DecisionReason::Rewritten, current)
}

/// True if the previously sampled head is still a prefix of the file
///
/// Only possible when the old sample covered the whole file, i.e. the file
/// was shorter than [`SAMPLE_SIZE`] and has only grown since.
fn head_extends(path: &Path, prior: &FileState, current: &Fingerprint) -> bool {
    if prior.file_hash.is_empty()
        || prior.file_size >= SAMPLE_SIZE
        || current.file_size <= prior.file_size
    {
        return false;
    }
    match hash_prefix(path, prior.file_size) {
        Ok(hash) => hash == prior.file_hash,
        Err(_) => false,
    }
}

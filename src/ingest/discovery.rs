//! Input discovery: expand a log glob into files ordered by mtime
//!
//! The pattern is split into a literal base directory and a glob tail. The
//! base is walked only as deep as the tail can reach, and `*` never crosses
//! a path separator (use `**` for recursion).

use crate::error::ConfigError;
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Find regular files matching `pattern`, oldest modification first
pub fn find_log_files(pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let (base, tail) = split_pattern(Path::new(pattern));

    let Some(tail) = tail else {
        // No glob characters: the pattern names a single file
        return Ok(if base.is_file() { vec![base] } else { Vec::new() });
    };

    let matcher = compile(pattern, &tail)?;
    let max_depth = if tail.split('/').any(|part| part == "**") {
        usize::MAX
    } else {
        tail.split('/').count()
    };

    let root = if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    };

    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in WalkDir::new(&root).min_depth(1).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable path during discovery");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            // Symlinked files still count
            if !(entry.path_is_symlink() && entry.path().is_file()) {
                continue;
            }
        }

        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        if !matcher.is_match(relative) {
            continue;
        }

        let mtime = entry
            .path()
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((mtime, entry.into_path()));
    }

    found.sort();
    debug!(pattern, matched = found.len(), "Discovered log files");
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Split into the literal directory prefix and the glob tail, if any
fn split_pattern(pattern: &Path) -> (PathBuf, Option<String>) {
    let mut base = PathBuf::new();
    let mut tail: Vec<String> = Vec::new();

    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy();
        let is_glob = matches!(component, Component::Normal(_)) && text.contains(GLOB_META);
        if tail.is_empty() && !is_glob {
            base.push(component);
        } else {
            tail.push(text.into_owned());
        }
    }

    if tail.is_empty() {
        (base, None)
    } else {
        (base, Some(tail.join("/")))
    }
}

fn compile(pattern: &str, tail: &str) -> Result<GlobMatcher, ConfigError> {
    GlobBuilder::new(tail)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

//! Source file content handling
//!
//! This module provides functions for:
//! - Computing sampled fingerprints for change detection
//! - Reading plain or gzip-compressed log files line by line with offsets

pub mod fingerprint;
pub mod reader;

pub use fingerprint::{fingerprint_file, hash_prefix, Fingerprint, SAMPLE_SIZE};
pub use reader::{Compression, LogReader};

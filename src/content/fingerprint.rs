//! Sampled content fingerprints for change detection
//!
//! A fingerprint is the MD5 digest of the first [`SAMPLE_SIZE`] bytes of a
//! file as stored on disk (compressed bytes for `.gz` inputs). It is cheap
//! to compute for arbitrarily large files and changes whenever the head of
//! the file is rewritten, as happens on rotation or truncation.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::warn;

/// Number of leading bytes hashed into a fingerprint
pub const SAMPLE_SIZE: u64 = 8192;

/// Fingerprint of a file at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    /// Hex MD5 of the sampled head, empty if the file could not be read
    pub hash: String,

    /// On-disk size when the sample was taken
    pub file_size: u64,
}

impl Fingerprint {
    /// True when hashing failed and the file must be treated as dirty
    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }

    /// Number of bytes the hash covers
    pub fn sample_len(&self) -> u64 {
        self.file_size.min(SAMPLE_SIZE)
    }
}

/// Compute an MD5 hex digest of bytes
pub fn compute_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Hash the first `len` bytes of a file
///
/// Reads fewer bytes if the file is shorter than `len`.
pub fn hash_prefix(path: &Path, len: u64) -> io::Result<String> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(len.min(SAMPLE_SIZE) as usize);
    file.take(len).read_to_end(&mut sample)?;
    Ok(compute_md5(&sample))
}

/// Fingerprint a file, never failing
///
/// I/O errors are logged and produce an empty fingerprint.
pub fn fingerprint_file(path: &Path) -> Fingerprint {
    let result = std::fs::metadata(path).and_then(|meta| {
        let hash = hash_prefix(path, SAMPLE_SIZE)?;
        Ok(Fingerprint {
            hash,
            file_size: meta.len(),
        })
    });

    match result {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to compute fingerprint");
            Fingerprint::default()
        }
    }
}

//! Line reader over plain or gzip-compressed log files
//!
//! The reader tracks how many bytes of the (decompressed) stream have been
//! consumed so the coordinator can checkpoint a resumable offset. Offsets
//! always land on a line boundary: trailing bytes of a plain file with no
//! `\n` yet (a line still being written) are held back and left for the
//! next run. A compressed archive is finished, so its end terminates the
//! last line.

use crate::error::{IngestError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Read buffer size for source files
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Compression container, chosen by filename suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain text
    None,
    /// gzip (`.gz`)
    Gzip,
}

impl Compression {
    /// Detect compression from the file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Streaming line reader with byte-offset tracking
pub struct LogReader {
    inner: Box<dyn BufRead + Send>,
    path: PathBuf,
    compression: Compression,
    offset: u64,
    held_back: u64,
    line_buf: Vec<u8>,
}

impl LogReader {
    /// Open `path` positioned at `start_offset`
    ///
    /// Plain files seek directly. Compressed files are decoded and the first
    /// `start_offset` decompressed bytes are discarded.
    pub fn open(path: &Path, start_offset: u64) -> Result<Self> {
        let open_err = |source: io::Error| IngestError::Open {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(open_err)?;
        let compression = Compression::from_path(path);

        let inner: Box<dyn BufRead + Send> = match compression {
            Compression::None => {
                if start_offset > 0 {
                    file.seek(SeekFrom::Start(start_offset)).map_err(open_err)?;
                }
                Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
            }
            Compression::Gzip => {
                let mut reader =
                    BufReader::with_capacity(READ_BUFFER_SIZE, MultiGzDecoder::new(file));
                if start_offset > 0 {
                    let skipped = io::copy(&mut (&mut reader).take(start_offset), &mut io::sink())
                        .map_err(open_err)?;
                    if skipped < start_offset {
                        return Err(open_err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!(
                                "decompressed stream has {} bytes, resume offset is {}",
                                skipped, start_offset
                            ),
                        )));
                    }
                }
                Box::new(reader)
            }
        };

        Ok(Self {
            inner,
            path: path.to_path_buf(),
            compression,
            offset: start_offset,
            held_back: 0,
            line_buf: Vec::with_capacity(1024),
        })
    }

    /// Bytes of the stream consumed so far, including the start offset
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Unterminated bytes left unread at end of a plain file
    pub fn held_back(&self) -> u64 {
        self.held_back
    }

    /// Read the next line, or `None` at end of stream
    ///
    /// Invalid UTF-8 is replaced rather than rejected; such lines then fail
    /// the grammar on their own merits.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.line_buf.clear();
        let n = self
            .inner
            .read_until(b'\n', &mut self.line_buf)
            .map_err(|source| IngestError::Read {
                path: self.path.clone(),
                offset: self.offset,
                source,
            })?;

        if n == 0 {
            return Ok(None);
        }

        if self.compression == Compression::None && self.line_buf.last() != Some(&b'\n') {
            self.held_back = n as u64;
            return Ok(None);
        }

        self.offset += n as u64;
        Ok(Some(String::from_utf8_lossy(&self.line_buf).into_owned()))
    }
}

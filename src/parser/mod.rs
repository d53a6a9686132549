//! Access-log line parsing
//!
//! Turns one raw line of Combined Log Format text into a [`LogRecord`].
//! The parser has no dependencies on storage or I/O.

pub mod combined;
pub mod record;

pub use combined::{parse_line, split_request, ParseOutcome};
pub use record::LogRecord;

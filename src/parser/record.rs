//! Parsed access-log record
//!
//! A [`LogRecord`] is one request line split into the columns stored in the
//! `logs` table. The timestamp is kept exactly as it appeared in the source
//! (`16/May/2025:00:06:10 +0000`); it is never reformatted.

use std::fmt;

/// One parsed Combined Log Format request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Raw `[...]` timestamp contents
    pub timestamp: String,

    /// Client address (dotted decimal)
    pub remote_addr: String,

    /// Authenticated user, `-` if absent
    pub remote_user: String,

    /// HTTP method, or the raw request when it has fewer than two tokens
    pub request_method: String,

    /// Request path (empty if the request line is malformed)
    pub request_path: String,

    /// Protocol version (empty if the request line is malformed)
    pub http_version: String,

    /// Response status, 0 if unparseable
    pub status: u32,

    /// Response body size, 0 if unparseable
    pub bytes_sent: u64,

    /// Referer header, `-` if absent
    pub referer: String,

    /// User-Agent header
    pub user_agent: String,
}

impl LogRecord {
    /// Reassemble the quoted request string
    pub fn request(&self) -> String {
        match (self.request_path.is_empty(), self.http_version.is_empty()) {
            (true, _) => self.request_method.clone(),
            (false, true) => format!("{} {}", self.request_method, self.request_path),
            (false, false) => format!(
                "{} {} {}",
                self.request_method, self.request_path, self.http_version
            ),
        }
    }
}

/// Renders the record back into Combined Log Format
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} [{}] \"{}\" {} {} \"{}\" \"{}\"",
            self.remote_addr,
            self.remote_user,
            self.timestamp,
            self.request(),
            self.status,
            self.bytes_sent,
            self.referer,
            self.user_agent,
        )
    }
}

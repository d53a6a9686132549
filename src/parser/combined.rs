//! Combined Log Format line parser
//!
//! Grammar:
//!
//! ```text
//! <addr> - <user> [<timestamp>] "<request>" <status> <bytes> "<referer>" "<user_agent>"
//! ```
//!
//! The parser never fails loudly. A line either yields a [`LogRecord`] or a
//! [`ParseOutcome`] telling the caller whether the line was blank (ignored)
//! or a miss (counted as a parse error).

use super::record::LogRecord;
use regex::Regex;
use std::sync::LazyLock;

/// Compiled Combined Log Format pattern, anchored at line start
static COMBINED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<remote_addr>[0-9.]+) - (?P<remote_user>[^ ]*) \[(?P<timestamp>.*?)\] "(?P<request>.*?)" (?P<status>[0-9]+) (?P<bytes_sent>[0-9]+) "(?P<referer>.*?)" "(?P<user_agent>.*?)""#,
    )
    .expect("Invalid combined log regex")
});

/// Result of parsing one raw line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Line matched the grammar
    Record(LogRecord),

    /// Empty or whitespace-only line
    Blank,

    /// Non-blank line that does not match the grammar
    Miss,
}

impl ParseOutcome {
    /// Take the record, if any
    pub fn into_record(self) -> Option<LogRecord> {
        match self {
            ParseOutcome::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Parse a single access-log line
pub fn parse_line(line: &str) -> ParseOutcome {
    let line = line.trim();
    if line.is_empty() {
        return ParseOutcome::Blank;
    }

    let Some(caps) = COMBINED_REGEX.captures(line) else {
        return ParseOutcome::Miss;
    };

    // Every group is mandatory in the pattern, so a match always has them
    let field = |name: &str| caps.name(name).map_or("", |m| m.as_str());

    let (request_method, request_path, http_version) = split_request(field("request"));

    ParseOutcome::Record(LogRecord {
        timestamp: field("timestamp").to_string(),
        remote_addr: field("remote_addr").to_string(),
        remote_user: field("remote_user").to_string(),
        request_method,
        request_path,
        http_version,
        status: parse_digits(field("status")),
        bytes_sent: parse_byte_count(field("bytes_sent")),
        referer: field("referer").to_string(),
        user_agent: field("user_agent").to_string(),
    })
}

/// Split a request string into (method, path, version)
///
/// At most three whitespace-separated tokens are taken; the third keeps the
/// remainder of the string. With fewer than two tokens the raw request
/// becomes the method and path/version are empty.
pub fn split_request(request: &str) -> (String, String, String) {
    let (first, rest) = next_token(request);
    let (second, rest) = next_token(rest);
    let third = rest.trim_start();

    match (first, second) {
        (Some(method), Some(path)) => (method.to_string(), path.to_string(), third.to_string()),
        _ => (request.to_string(), String::new(), String::new()),
    }
}

/// Take the next whitespace-delimited token and the text after it
fn next_token(s: &str) -> (Option<&str>, &str) {
    let s = s.trim_start();
    if s.is_empty() {
        return (None, s);
    }
    match s.find(char::is_whitespace) {
        Some(end) => (Some(&s[..end]), &s[end..]),
        None => (Some(s), ""),
    }
}

/// Parse a byte count that fits SQLite's signed INTEGER, falling back to 0
fn parse_byte_count(s: &str) -> u64 {
    u64::try_from(parse_digits::<i64>(s)).unwrap_or(0)
}

/// Parse an all-digit capture, falling back to 0
fn parse_digits<T: std::str::FromStr + Default>(s: &str) -> T {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return T::default();
    }
    s.parse().unwrap_or_default()
}

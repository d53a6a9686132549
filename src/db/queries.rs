//! Read-only reports over the ingested logs
//!
//! Every report is a single SQL statement over `logs` and comes back as a
//! [`ReportTable`] of display strings, so the CLI can render it as a table
//! or write it out as CSV without knowing its shape.
//!
//! Duplicate detection lives here too; removal is a write and goes through
//! [`StoreTransaction::remove_duplicates`](crate::db::StoreTransaction::remove_duplicates).

use crate::db::store::LogStore;
use crate::error::DbResult;
use clap::ValueEnum;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Params};

/// Columns that make two rows the same request
pub const DUPLICATE_KEY: &str =
    "timestamp, remote_addr, request_method, request_path, status, bytes_sent, user_agent";

/// Available reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Report {
    /// Totals, date range, average size and error rate
    Overview,
    /// Requests per status code
    Status,
    /// Requests per HTTP method
    Methods,
    /// Most active client addresses
    Ips,
    /// Most requested paths
    Paths,
    /// Top referrers, direct traffic excluded
    Referrers,
    /// Traffic per hour with peak detection
    Hourly,
    /// Traffic per day with peak detection
    Daily,
    /// Crawler and scripted client activity
    Bots,
    /// Requests matching common attack patterns
    Threats,
    /// Client and server errors per hour
    Errors,
}

impl Report {
    /// Heading shown above the rendered table
    pub fn title(self) -> &'static str {
        match self {
            Report::Overview => "Overview",
            Report::Status => "Status Codes",
            Report::Methods => "Request Methods",
            Report::Ips => "Top IP Addresses",
            Report::Paths => "Top Paths",
            Report::Referrers => "Top Referrers",
            Report::Hourly => "Hourly Traffic",
            Report::Daily => "Daily Traffic",
            Report::Bots => "Bot Activity",
            Report::Threats => "Security Threats",
            Report::Errors => "Errors by Hour",
        }
    }
}

/// Column names plus rows of display strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    /// True if the report matched nothing
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row` under column `name`
    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.columns.iter().position(|c| c == name)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Write as CSV with a header row
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&self.columns)?;
        for row in &self.rows {
            out.write_record(row)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Headline numbers for the whole database
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overview {
    pub total_requests: u64,
    pub unique_ips: u64,
    pub unique_paths: u64,
    pub earliest: Option<String>,
    pub latest: Option<String>,

    /// Mean `bytes_sent`, 0 when empty
    pub avg_response_size: f64,

    /// Percentage of responses with status >= 400, 0 when empty
    pub error_rate: f64,
}

/// Compute the overview
pub fn overview(store: &LogStore) -> DbResult<Overview> {
    let overview = store.connection().query_row(
        "SELECT COUNT(*),
                COUNT(DISTINCT remote_addr),
                COUNT(DISTINCT request_path),
                MIN(timestamp),
                MAX(timestamp),
                COALESCE(AVG(bytes_sent), 0.0),
                COALESCE(SUM(CASE WHEN status >= 400 THEN 1 ELSE 0 END) * 100.0
                         / NULLIF(COUNT(*), 0), 0.0)
         FROM logs",
        [],
        |row| {
            Ok(Overview {
                total_requests: row.get::<_, i64>(0)?.max(0) as u64,
                unique_ips: row.get::<_, i64>(1)?.max(0) as u64,
                unique_paths: row.get::<_, i64>(2)?.max(0) as u64,
                earliest: row.get(3)?,
                latest: row.get(4)?,
                avg_response_size: row.get(5)?,
                error_rate: row.get(6)?,
            })
        },
    )?;
    Ok(overview)
}

/// Run a report; `limit` caps the top-N reports
pub fn run_report(store: &LogStore, report: Report, limit: u32) -> DbResult<ReportTable> {
    let conn = store.connection();
    match report {
        Report::Overview => overview(store).map(|o| overview_table(&o)),
        Report::Status => query_table(conn, STATUS_SQL, []),
        Report::Methods => query_table(conn, METHODS_SQL, []),
        Report::Ips => query_table(conn, TOP_IPS_SQL, [limit]),
        Report::Paths => query_table(conn, TOP_PATHS_SQL, [limit]),
        Report::Referrers => query_table(conn, TOP_REFERRERS_SQL, [limit]),
        Report::Hourly => query_table(conn, &traffic_sql(HOUR_BUCKET), [limit]),
        Report::Daily => query_table(conn, &traffic_sql(DAY_BUCKET), [limit]),
        Report::Bots => query_table(conn, BOTS_SQL, [limit]),
        Report::Threats => query_table(conn, THREATS_SQL, [limit]),
        Report::Errors => query_table(conn, ERRORS_SQL, [limit]),
    }
}

/// Rows that repeat an earlier row's request key
pub fn count_duplicates(store: &LogStore) -> DbResult<u64> {
    let sql = format!(
        "SELECT COALESCE(SUM(cnt - 1), 0) FROM (
             SELECT COUNT(*) AS cnt FROM logs GROUP BY {} HAVING cnt > 1
         )",
        DUPLICATE_KEY
    );
    let extra: i64 = store.connection().query_row(&sql, [], |row| row.get(0))?;
    Ok(extra.max(0) as u64)
}

fn overview_table(o: &Overview) -> ReportTable {
    let range = match (&o.earliest, &o.latest) {
        (Some(first), Some(last)) => format!("{} -> {}", first, last),
        _ => "-".to_string(),
    };
    let rows = [
        ("total requests", o.total_requests.to_string()),
        ("unique ips", o.unique_ips.to_string()),
        ("unique paths", o.unique_paths.to_string()),
        ("date range", range),
        ("avg response size", format!("{:.1} kb", o.avg_response_size / 1024.0)),
        ("error rate", format!("{:.2}%", o.error_rate)),
    ];
    ReportTable {
        columns: vec!["metric".into(), "value".into()],
        rows: rows
            .into_iter()
            .map(|(metric, value)| vec![metric.to_string(), value])
            .collect(),
    }
}

fn query_table<P: Params>(conn: &Connection, sql: &str, params: P) -> DbResult<ReportTable> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let rows = stmt
        .query_map(params, |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(display_value))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReportTable { columns, rows })
}

fn display_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format!("{:.2}", f),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// `dd/Mon/yyyy:HH` prefix of the raw timestamp
const HOUR_BUCKET: &str = "substr(timestamp, 1, 14)";

/// `dd/Mon/yyyy` prefix of the raw timestamp
const DAY_BUCKET: &str = "substr(timestamp, 1, 11)";

const STATUS_SQL: &str = "
SELECT status,
       COUNT(*) AS count,
       printf('%.2f%%', COUNT(*) * 100.0 / (SELECT COUNT(*) FROM logs)) AS percentage,
       CASE
           WHEN status < 300 THEN 'success'
           WHEN status < 400 THEN 'redirect'
           WHEN status < 500 THEN 'client_error'
           ELSE 'server_error'
       END AS category
FROM logs
GROUP BY status
ORDER BY count DESC, status ASC";

const METHODS_SQL: &str = "
SELECT request_method,
       COUNT(*) AS count,
       printf('%.2f%%', COUNT(*) * 100.0 / (SELECT COUNT(*) FROM logs)) AS percentage
FROM logs
WHERE request_method != ''
GROUP BY request_method
ORDER BY count DESC, request_method ASC";

const TOP_IPS_SQL: &str = "
SELECT remote_addr,
       COUNT(*) AS requests,
       COUNT(DISTINCT request_path) AS unique_paths,
       MIN(timestamp) AS first_seen,
       MAX(timestamp) AS last_seen,
       SUM(bytes_sent) AS total_bytes,
       printf('%.2f%%', COUNT(*) * 100.0 / (SELECT COUNT(*) FROM logs)) AS percentage,
       CASE
           WHEN remote_addr LIKE '10.%' OR remote_addr LIKE '192.168.%'
                OR remote_addr LIKE '172.%' THEN 'private'
           WHEN remote_addr LIKE '127.%' OR remote_addr = '::1' THEN 'localhost'
           ELSE 'public'
       END AS ip_type
FROM logs
GROUP BY remote_addr
ORDER BY requests DESC, remote_addr ASC
LIMIT ?1";

const TOP_PATHS_SQL: &str = "
SELECT request_path,
       COUNT(*) AS requests,
       COUNT(DISTINCT remote_addr) AS unique_visitors,
       printf('%.1f', AVG(bytes_sent)) AS avg_size_bytes,
       printf('%.1f%%', COUNT(*) * 100.0 / (SELECT COUNT(*) FROM logs)) AS percentage
FROM logs
WHERE request_path != ''
GROUP BY request_path
ORDER BY requests DESC, request_path ASC
LIMIT ?1";

const TOP_REFERRERS_SQL: &str = "
SELECT referer,
       COUNT(*) AS requests,
       COUNT(DISTINCT remote_addr) AS unique_visitors,
       printf('%.2f%%', COUNT(*) * 100.0 / (SELECT COUNT(*) FROM logs)) AS percentage
FROM logs
WHERE referer != '-' AND referer != '' AND referer IS NOT NULL
GROUP BY referer
ORDER BY requests DESC, referer ASC
LIMIT ?1";

fn traffic_sql(bucket: &str) -> String {
    format!(
        "
WITH traffic AS (
    SELECT {bucket} AS period,
           COUNT(*) AS requests,
           COUNT(DISTINCT remote_addr) AS unique_visitors,
           SUM(bytes_sent) AS total_bytes,
           AVG(bytes_sent) AS avg_size
    FROM logs
    GROUP BY period
),
baseline AS (
    SELECT AVG(requests) AS avg_requests FROM traffic
)
SELECT t.period,
       t.requests,
       t.unique_visitors,
       printf('%.2f mb', t.total_bytes / 1024.0 / 1024.0) AS bandwidth,
       printf('%.1f kb', t.avg_size / 1024.0) AS avg_response_size,
       CASE
           WHEN t.requests > b.avg_requests * 2 THEN 'peak'
           WHEN t.requests < b.avg_requests * 0.5 THEN 'low'
           ELSE 'normal'
       END AS traffic_level
FROM traffic t CROSS JOIN baseline b
ORDER BY t.period DESC
LIMIT ?1"
    )
}

const BOTS_SQL: &str = "
SELECT user_agent,
       COUNT(*) AS requests,
       COUNT(DISTINCT request_path) AS unique_paths,
       COUNT(DISTINCT remote_addr) AS unique_ips,
       printf('%.2f', COUNT(*) * 1.0 / COUNT(DISTINCT request_path)) AS requests_per_path,
       MIN(timestamp) AS first_seen,
       MAX(timestamp) AS last_seen,
       CASE
           WHEN user_agent LIKE '%bot%' OR user_agent LIKE '%spider%'
                OR user_agent LIKE '%crawler%' THEN 'identified_bot'
           WHEN COUNT(*) > 1000 AND COUNT(DISTINCT request_path) < 10 THEN 'suspicious_bot'
           WHEN COUNT(*) > 100 AND user_agent LIKE '%curl%' THEN 'api_client'
           ELSE 'unknown'
       END AS bot_type
FROM logs
WHERE user_agent LIKE '%bot%' OR user_agent LIKE '%spider%'
   OR user_agent LIKE '%crawler%' OR user_agent LIKE '%scan%'
   OR (user_agent LIKE '%curl%' AND user_agent NOT LIKE '%Mozilla%')
GROUP BY user_agent
ORDER BY requests DESC, user_agent ASC
LIMIT ?1";

const THREATS_SQL: &str = "
SELECT request_path,
       remote_addr,
       COUNT(*) AS attempts,
       COUNT(DISTINCT substr(timestamp, 1, 11)) AS days_active,
       MAX(status) AS max_status,
       MAX(user_agent) AS user_agent,
       CASE
           WHEN request_path LIKE '%../%' THEN 'directory_traversal'
           WHEN request_path LIKE '%.php%' AND request_path LIKE '%admin%' THEN 'php_admin_scan'
           WHEN request_path LIKE '%wp-%' THEN 'wordpress_scan'
           WHEN request_path LIKE '%.git%' OR request_path LIKE '%.env%' THEN 'config_file_scan'
           WHEN request_path LIKE '%shell%' OR request_path LIKE '%cmd%' THEN 'shell_scan'
           WHEN request_path LIKE '%passwd%' OR request_path LIKE '%shadow%' THEN 'system_file_scan'
           WHEN request_path LIKE '%sql%' OR request_path LIKE '%union%' THEN 'sql_injection'
           WHEN request_path LIKE '%script%' OR request_path LIKE '%alert%' THEN 'xss'
           ELSE 'generic_scan'
       END AS attack_type
FROM logs
WHERE request_path LIKE '%../%' OR request_path LIKE '%.php%'
   OR request_path LIKE '%shell%' OR request_path LIKE '%admin%'
   OR request_path LIKE '%wp-%' OR request_path LIKE '%.git%'
   OR request_path LIKE '%passwd%' OR request_path LIKE '%.env%'
   OR request_path LIKE '%credentials%' OR request_path LIKE '%config%'
   OR request_path LIKE '%sql%' OR request_path LIKE '%union%'
   OR request_path LIKE '%script%' OR request_path LIKE '%alert%'
GROUP BY request_path, remote_addr
ORDER BY attempts DESC, days_active DESC, request_path ASC
LIMIT ?1";

const ERRORS_SQL: &str = "
SELECT substr(timestamp, 1, 14) AS period,
       COUNT(*) AS total_requests,
       SUM(CASE WHEN status >= 400 AND status < 500 THEN 1 ELSE 0 END) AS client_errors,
       SUM(CASE WHEN status >= 500 THEN 1 ELSE 0 END) AS server_errors,
       printf('%.2f%%',
              SUM(CASE WHEN status >= 400 THEN 1 ELSE 0 END) * 100.0 / COUNT(*)) AS error_rate,
       MAX(CASE WHEN status >= 400 THEN request_path END) AS sample_error_path
FROM logs
GROUP BY period
HAVING SUM(CASE WHEN status >= 400 THEN 1 ELSE 0 END) > 0
ORDER BY period DESC
LIMIT ?1";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    fn store_with(lines: &[(&str, &str, &str, u16, &str)]) -> LogStore {
        let mut store = LogStore::open_in_memory().unwrap();
        let records: Vec<_> = lines
            .iter()
            .map(|(ip, ts, path, status, agent)| {
                let line = format!(
                    r#"{} - - [{} +0000] "GET {} HTTP/1.1" {} 2048 "-" "{}""#,
                    ip, ts, path, status, agent
                );
                parse_line(&line).into_record().unwrap()
            })
            .collect();
        store.insert_records(&records, "t").unwrap();
        store
    }

    fn sample_store() -> LogStore {
        store_with(&[
            ("10.0.0.1", "16/May/2025:00:06:10", "/", 200, "Mozilla/5.0"),
            ("10.0.0.1", "16/May/2025:00:07:10", "/about", 200, "Mozilla/5.0"),
            ("203.0.113.9", "16/May/2025:01:00:00", "/.env", 404, "zgrab/0.x scan"),
            ("203.0.113.9", "17/May/2025:01:00:00", "/.env", 404, "zgrab/0.x scan"),
            ("127.0.0.1", "17/May/2025:02:00:00", "/", 500, "Googlebot/2.1"),
        ])
    }

    #[test]
    fn test_overview() {
        let store = sample_store();
        let o = overview(&store).unwrap();
        assert_eq!(o.total_requests, 5);
        assert_eq!(o.unique_ips, 3);
        assert_eq!(o.unique_paths, 3);
        assert_eq!(o.earliest.as_deref(), Some("16/May/2025:00:06:10 +0000"));
        assert!((o.avg_response_size - 2048.0).abs() < f64::EPSILON);
        assert!((o.error_rate - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_overview_of_empty_database() {
        let store = LogStore::open_in_memory().unwrap();
        let o = overview(&store).unwrap();
        assert_eq!(o.total_requests, 0);
        assert_eq!(o.earliest, None);
        assert_eq!(o.error_rate, 0.0);

        let table = run_report(&store, Report::Overview, 10).unwrap();
        assert_eq!(table.value(3, "value"), Some("-"));
    }

    #[test]
    fn test_top_ips_classifies_addresses() {
        let store = sample_store();
        let table = run_report(&store, Report::Ips, 2).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.value(0, "remote_addr"), Some("10.0.0.1"));
        assert_eq!(table.value(0, "ip_type"), Some("private"));
        assert_eq!(table.value(0, "percentage"), Some("40.00%"));
        assert_eq!(table.value(1, "ip_type"), Some("public"));
    }

    #[test]
    fn test_status_categories() {
        let store = sample_store();
        let table = run_report(&store, Report::Status, 10).unwrap();
        assert_eq!(table.value(0, "status"), Some("200"));
        assert_eq!(table.value(0, "count"), Some("2"));
        assert_eq!(table.value(2, "category"), Some("server_error"));
    }

    #[test]
    fn test_threats_and_bots() {
        let store = sample_store();
        let threats = run_report(&store, Report::Threats, 10).unwrap();
        assert_eq!(threats.rows.len(), 1);
        assert_eq!(threats.value(0, "attack_type"), Some("config_file_scan"));
        assert_eq!(threats.value(0, "attempts"), Some("2"));
        assert_eq!(threats.value(0, "days_active"), Some("2"));

        let bots = run_report(&store, Report::Bots, 10).unwrap();
        assert_eq!(bots.rows.len(), 2);
        let types: Vec<_> = (0..2).filter_map(|i| bots.value(i, "bot_type")).collect();
        assert!(types.contains(&"identified_bot"));
    }

    #[test]
    fn test_traffic_buckets() {
        let store = sample_store();
        let daily = run_report(&store, Report::Daily, 10).unwrap();
        assert_eq!(daily.rows.len(), 2);
        assert_eq!(daily.value(0, "period"), Some("17/May/2025"));

        let hourly = run_report(&store, Report::Hourly, 10).unwrap();
        assert_eq!(hourly.rows.len(), 4);
        assert_eq!(hourly.value(3, "period"), Some("16/May/2025:00"));
        assert_eq!(hourly.value(3, "requests"), Some("2"));
    }

    #[test]
    fn test_errors_report_skips_clean_hours() {
        let store = sample_store();
        let table = run_report(&store, Report::Errors, 10).unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.value(0, "server_errors"), Some("1"));
    }

    #[test]
    fn test_count_duplicates() {
        let store = store_with(&[
            ("1.1.1.1", "16/May/2025:00:00:00", "/a", 200, "x"),
            ("1.1.1.1", "16/May/2025:00:00:00", "/a", 200, "x"),
            ("1.1.1.1", "16/May/2025:00:00:00", "/a", 200, "x"),
            ("1.1.1.1", "16/May/2025:00:00:00", "/a", 404, "x"),
            ("2.2.2.2", "16/May/2025:00:00:01", "/b", 200, "x"),
        ]);
        assert_eq!(count_duplicates(&store).unwrap(), 2);
    }

    #[test]
    fn test_csv_output() {
        let table = ReportTable {
            columns: vec!["path".into(), "requests".into()],
            rows: vec![vec!["/a,b".into(), "3".into()]],
        };
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "path,requests\n\"/a,b\",3\n");
    }
}

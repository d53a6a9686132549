//! Integration tests for nginx-sqlize
//!
//! End-to-end ingestion against real files in a temp directory and an
//! in-memory or on-disk SQLite store.

use flate2::write::GzEncoder;
use nginx_sqlize::db::{schema, LogStore, DEFAULT_BUSY_TIMEOUT};
use nginx_sqlize::ingest::{find_log_files, FileStage, IngestCoordinator, IngestOptions};
use nginx_sqlize::{DbError, FileOutcome, IngestError};
use rusqlite::Connection;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

const MALFORMED: &str = "this is not an access log line\n";

fn line(i: usize) -> String {
    format!(
        "203.0.113.{} - - [16/May/2025:00:{:02}:{:02} +0000] \"GET /page/{} HTTP/1.1\" 200 {} \"-\" \"Mozilla/5.0\"\n",
        i % 250,
        (i / 60) % 60,
        i % 60,
        i,
        512 + i
    )
}

fn append_lines(path: &Path, range: std::ops::Range<usize>) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    for i in range {
        file.write_all(line(i).as_bytes()).unwrap();
    }
}

fn coordinator(batch_size: usize, force: bool) -> IngestCoordinator {
    IngestCoordinator::new(
        LogStore::open_in_memory().unwrap(),
        IngestOptions { batch_size, force },
    )
}

fn state_key(path: &Path) -> String {
    std::fs::canonicalize(path).unwrap().to_string_lossy().into_owned()
}

fn append_raw(path: &Path, bytes: &[u8]) {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap()
        .write_all(bytes)
        .unwrap();
}

#[test]
fn test_database_schema_creation() {
    let conn = Connection::open_in_memory().unwrap();
    schema::create_database(&conn).unwrap();
    schema::create_indexes(&conn).unwrap();

    let tables: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table'")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert!(tables.contains(&"logs".to_string()));
    assert!(tables.contains(&"processed_files".to_string()));
    assert!(tables.contains(&"ingest_info".to_string()));
}

#[test]
fn test_malformed_line_is_counted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..2);
    OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(MALFORMED.as_bytes())
        .unwrap();
    append_lines(&path, 2..4);

    let mut coord = coordinator(1000, false);
    let report = coord.ingest_file(&path).unwrap();

    assert_eq!(report.lines_read, 5);
    assert_eq!(report.records_inserted, 4);
    assert_eq!(report.parse_errors, 1);
    assert_eq!(coord.store().count_records().unwrap(), 4);
}

#[test]
fn test_blank_lines_are_not_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..1);
    OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(b"\n   \n")
        .unwrap();

    let mut coord = coordinator(1000, false);
    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 3);
    assert_eq!(report.records_inserted, 1);
    assert_eq!(report.parse_errors, 0);
}

#[test]
fn test_unchanged_rerun_inserts_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..5);

    let mut coord = coordinator(1000, false);
    coord.ingest_file(&path).unwrap();

    let again = coord.ingest_file(&path).unwrap();
    assert!(again.is_skipped());
    assert_eq!(again.records_inserted, 0);
    assert_eq!(coord.store().count_records().unwrap(), 5);
}

#[test]
fn test_force_reprocesses_everything() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..5);

    let mut coord = coordinator(1000, false);
    coord.ingest_file(&path).unwrap();

    let mut forced = IngestCoordinator::new(
        coord.into_store(),
        IngestOptions {
            batch_size: 1000,
            force: true,
        },
    );
    let report = forced.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 5);
    assert_eq!(report.records_inserted, 5);
    assert_eq!(forced.store().count_records().unwrap(), 10);

    let state = forced.store().get_file_state(&state_key(&path)).unwrap().unwrap();
    assert_eq!(state.lines_processed, 5);
    assert!(state.complete);
}

#[test]
fn test_finalize_failure_leaves_state_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..4);

    let mut coord = coordinator(1000, false);
    coord.ingest_file(&path).unwrap();
    let before = coord.store().get_file_state(&state_key(&path)).unwrap().unwrap();

    append_lines(&path, 4..8);
    coord
        .store()
        .connection()
        .execute_batch(
            "CREATE TRIGGER fail_insert BEFORE INSERT ON processed_files
             BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;
             CREATE TRIGGER fail_update BEFORE UPDATE ON processed_files
             BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;",
        )
        .unwrap();

    let outcome = coord.process_file(&path);
    match outcome {
        FileOutcome::Failed { stage, error, .. } => {
            assert_eq!(stage, FileStage::Finalizing);
            assert!(error.is_storage());
        }
        other => panic!("expected failure, got {:?}", other),
    }

    assert_eq!(coord.store().count_records().unwrap(), 4);
    let after = coord.store().get_file_state(&state_key(&path)).unwrap().unwrap();
    assert_eq!(after, before);
}

#[test]
fn test_flush_failure_keeps_earlier_batches() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..10);

    let mut coord = coordinator(4, false);
    coord
        .store()
        .connection()
        .execute_batch(
            "CREATE TRIGGER fail_second_batch BEFORE INSERT ON logs
             WHEN NEW.request_path = '/page/6'
             BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;",
        )
        .unwrap();

    match coord.process_file(&path) {
        FileOutcome::Failed { stage, error, .. } => {
            assert_eq!(stage, FileStage::Flushing);
            assert!(error.is_storage());
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // Only the first batch and its checkpoint survive
    let first_batch: u64 = (0..4).map(|i| line(i).len() as u64).sum();
    let state = coord.store().get_file_state(&state_key(&path)).unwrap().unwrap();
    assert_eq!(state.lines_processed, 4);
    assert_eq!(state.last_offset, first_batch);
    assert!(!state.complete);
    assert_eq!(coord.store().count_records().unwrap(), 4);

    coord
        .store()
        .connection()
        .execute_batch("DROP TRIGGER fail_second_batch")
        .unwrap();

    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 6);
    assert_eq!(report.records_inserted, 6);

    let distinct: i64 = coord
        .store()
        .connection()
        .query_row("SELECT COUNT(DISTINCT request_path) FROM logs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(coord.store().count_records().unwrap(), 10);
    assert_eq!(distinct, 10);
}

#[test]
fn test_locked_database_fails_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..3);
    let db_path = dir.path().join("nginx_logs.db");

    let store = LogStore::open(&db_path, Duration::from_millis(200)).unwrap();
    let mut coord = IngestCoordinator::new(store, IngestOptions::default());

    let holder = Connection::open(&db_path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE").unwrap();

    match coord.process_file(&path) {
        FileOutcome::Failed { error, .. } => {
            assert!(matches!(error, IngestError::Database(DbError::Locked)));
        }
        other => panic!("expected lock failure, got {:?}", other),
    }

    holder.execute_batch("ROLLBACK").unwrap();
    assert_eq!(coord.store().count_records().unwrap(), 0);
    assert_eq!(coord.ingest_file(&path).unwrap().records_inserted, 3);
}

#[test]
fn test_partial_last_line_completed_by_append() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..1);
    append_raw(
        &path,
        br#"198.51.100.7 - - [16/May/2025:00:06:11 +0000] "GET /b HT"#,
    );

    let mut coord = coordinator(1000, false);
    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 1);
    assert_eq!(report.records_inserted, 1);
    assert_eq!(report.parse_errors, 0);

    append_raw(&path, b"TP/1.1\" 200 6 \"-\" \"x\"\n");
    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 1);
    assert_eq!(report.records_inserted, 1);
    assert_eq!(report.parse_errors, 0);
    assert_eq!(coord.store().count_records().unwrap(), 2);

    let state = coord.store().get_file_state(&state_key(&path)).unwrap().unwrap();
    assert_eq!(state.last_offset, std::fs::metadata(&path).unwrap().len());
    assert_eq!(state.lines_processed, 2);

    let path_b: String = coord
        .store()
        .connection()
        .query_row("SELECT request_path FROM logs WHERE remote_addr = '198.51.100.7'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(path_b, "/b");
}

#[test]
fn test_identical_content_at_two_paths() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("a.log");
    let second = dir.path().join("b.log");
    append_lines(&first, 0..3);
    std::fs::copy(&first, &second).unwrap();

    let mut coord = coordinator(1000, false);
    assert_eq!(coord.ingest_file(&first).unwrap().records_inserted, 3);
    assert_eq!(coord.ingest_file(&second).unwrap().records_inserted, 3);
    assert_eq!(coord.store().count_records().unwrap(), 6);
    assert_eq!(coord.store().count_files().unwrap(), 2);
}

#[test]
fn test_small_file_append_ingests_only_new_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..3);

    let mut coord = coordinator(1000, false);
    coord.ingest_file(&path).unwrap();

    append_lines(&path, 3..5);
    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 2);
    assert_eq!(report.records_inserted, 2);
    assert_eq!(coord.store().count_records().unwrap(), 5);

    let state = coord.store().get_file_state(&state_key(&path)).unwrap().unwrap();
    assert_eq!(state.lines_processed, 5);
    assert_eq!(state.last_offset, std::fs::metadata(&path).unwrap().len());
}

#[test]
fn test_large_file_append_resumes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..200);
    assert!(std::fs::metadata(&path).unwrap().len() > 8192);

    let mut coord = coordinator(64, false);
    assert_eq!(coord.ingest_file(&path).unwrap().records_inserted, 200);

    append_lines(&path, 200..210);
    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.records_inserted, 10);
    assert_eq!(coord.store().count_records().unwrap(), 210);
}

#[test]
fn test_rotation_restarts_from_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    append_lines(&path, 0..5);

    let mut coord = coordinator(1000, false);
    coord.ingest_file(&path).unwrap();

    // Rotated: replaced by a new file under the same name
    std::fs::remove_file(&path).unwrap();
    append_lines(&path, 100..103);

    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 3);
    assert_eq!(report.records_inserted, 3);
    assert_eq!(coord.store().count_records().unwrap(), 8);

    let state = coord.store().get_file_state(&state_key(&path)).unwrap().unwrap();
    assert_eq!(state.lines_processed, 3);
}

#[test]
fn test_gzip_is_transparent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log.1.gz");
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::default());
    for i in 0..25 {
        encoder.write_all(line(i).as_bytes()).unwrap();
    }
    encoder.finish().unwrap();

    let mut coord = coordinator(10, false);
    let report = coord.ingest_file(&path).unwrap();
    assert_eq!(report.lines_read, 25);
    assert_eq!(report.records_inserted, 25);

    let again = coord.ingest_file(&path).unwrap();
    assert!(again.is_skipped());
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempdir().unwrap();
    let mut coord = coordinator(1000, false);
    let result = coord.ingest_file(&dir.path().join("gone.log"));
    assert!(matches!(result, Err(IngestError::Open { .. })));
}

#[test]
fn test_glob_run_on_disk_database() {
    let dir = tempdir().unwrap();
    let logs = dir.path().join("logs");
    std::fs::create_dir(&logs).unwrap();
    append_lines(&logs.join("access.log.1"), 0..7);
    append_lines(&logs.join("access.log"), 7..10);
    append_lines(&logs.join("error.log"), 0..1);

    let db_path: PathBuf = dir.path().join("db/nginx_logs.db");
    let store = LogStore::open(&db_path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let mut coord = IngestCoordinator::new(store, IngestOptions::default());

    let files = find_log_files(&format!("{}/access*", logs.display())).unwrap();
    assert_eq!(files.len(), 2);

    let summary = coord.run(&files);
    assert!(summary.is_success());
    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.records_inserted, 10);
    drop(coord);

    // State survives reopening
    let store = LogStore::open(&db_path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let mut coord = IngestCoordinator::new(store, IngestOptions::default());
    let summary = coord.run(&files);
    assert_eq!(summary.files_skipped, 2);
    assert_eq!(coord.store().count_records().unwrap(), 10);
}

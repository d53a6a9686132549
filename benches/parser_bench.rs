//! Benchmarks for nginx-sqlize
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nginx_sqlize::db::{BatchWriter, LogStore};
use nginx_sqlize::parser::{parse_line, LogRecord};

const SHORT_LINE: &str =
    r#"78.153.140.148 - - [16/May/2025:00:06:10 +0000] "GET /.env HTTP/1.1" 404 187 "-" "Mozilla/5.0""#;

const LONG_LINE: &str = r#"203.0.113.45 - admin [16/May/2025:12:30:45 +0000] "POST /api/v1/users/create?source=dashboard&ref=settings HTTP/2.0" 201 5321 "https://example.com/admin/users/new" "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36""#;

const MALFORMED_LINE: &str = "GET /index.html 200 - not a combined log line at all";

fn bench_parse_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");

    group.throughput(Throughput::Elements(1));
    group.bench_function("short", |b| b.iter(|| parse_line(black_box(SHORT_LINE))));
    group.bench_function("long", |b| b.iter(|| parse_line(black_box(LONG_LINE))));
    group.bench_function("malformed", |b| b.iter(|| parse_line(black_box(MALFORMED_LINE))));

    group.throughput(Throughput::Elements(1000));
    group.bench_function("throughput_1000", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                black_box(parse_line(black_box(SHORT_LINE)));
            }
        })
    });

    group.finish();
}

fn bench_batch_insert(c: &mut Criterion) {
    let record: LogRecord = parse_line(LONG_LINE)
        .into_record()
        .expect("benchmark line must parse");

    let mut group = c.benchmark_group("batch_insert");
    for batch_size in [100usize, 1000, 10_000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                let mut store = LogStore::open_in_memory().unwrap();
                b.iter(|| {
                    let mut writer = BatchWriter::new(batch_size);
                    let records = std::iter::repeat(record.clone()).take(batch_size);
                    writer.write_all(&mut store, records).unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_parse_line, bench_batch_insert);
criterion_main!(benches);

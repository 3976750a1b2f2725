//! Transform throughput benchmarks.
//!
//! Covers the per-row work of the event pipeline:
//! - **start_time**: epoch milliseconds to localized ISO-8601 text.
//! - **calendar**: `start_time` text to the six calendar columns.
//! - **dedup**: full-row `distinct` over play-shaped tables with a tunable
//!   share of repeated rows.
//!
//! # Running
//!
//! ```sh
//! cargo bench --bench transform_throughput
//! ```

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use confluence::events::build_time;
use confluence::timestamp::{Timezone, calendar_columns, start_time_column};
use criterion::{BenchmarkId, Criterion, Throughput};
use rand::Rng;
use sluice::Table;

// ============================================================================
// Test data generators
// ============================================================================

/// Epoch milliseconds spread over November 2018.
fn generate_timestamps(count: usize) -> ArrayRef {
    let mut rng = rand::rng();
    let start: i64 = 1_541_030_400_000;
    let month: i64 = 30 * 24 * 3600 * 1000;
    let values: Vec<i64> = (0..count)
        .map(|_| start + rng.random_range(0..month))
        .collect();
    Arc::new(Int64Array::from(values))
}

/// Play-like rows drawn from `distinct` underlying rows.
fn generate_plays(count: usize, distinct: usize) -> Table {
    let mut rng = rand::rng();
    let levels = ["free", "paid"];
    let picks: Vec<usize> = (0..count).map(|_| rng.random_range(0..distinct)).collect();
    let user_ids: Vec<String> = picks.iter().map(|p| (p % 97).to_string()).collect();
    let levels: Vec<&str> = picks.iter().map(|p| levels[p % 2]).collect();
    let ts: Vec<i64> = picks
        .iter()
        .map(|p| 1_541_030_400_000 + *p as i64 * 1000)
        .collect();
    let ts: ArrayRef = Arc::new(Int64Array::from(ts));
    let start_time = start_time_column(&ts, Timezone::Utc).unwrap();
    Table::from_columns(vec![
        ("userId", Arc::new(StringArray::from(user_ids)) as ArrayRef),
        ("level", Arc::new(StringArray::from(levels)) as ArrayRef),
        ("ts", ts),
        ("start_time", start_time),
    ])
    .unwrap()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_start_time(c: &mut Criterion) {
    let mut group = c.benchmark_group("start_time");
    for num_rows in [1_000, 10_000, 100_000] {
        let ts = generate_timestamps(num_rows);
        group.throughput(Throughput::Elements(num_rows as u64));
        for (label, tz) in [("utc", Timezone::Utc), ("offset", "-08:00".parse().unwrap())] {
            group.bench_with_input(BenchmarkId::new(label, num_rows), &ts, |b, ts| {
                b.iter(|| start_time_column(ts, tz).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_calendar(c: &mut Criterion) {
    let mut group = c.benchmark_group("calendar");
    for num_rows in [1_000, 10_000, 100_000] {
        let ts = generate_timestamps(num_rows);
        let start_time = start_time_column(&ts, Timezone::Utc).unwrap();
        group.throughput(Throughput::Elements(num_rows as u64));
        group.bench_with_input(
            BenchmarkId::new("calendar_columns", num_rows),
            &start_time,
            |b, st| {
                b.iter(|| calendar_columns(st).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_dedup(c: &mut Criterion) {
    let num_rows = 100_000;
    let mut group = c.benchmark_group("dedup");
    group.sample_size(20);
    group.throughput(Throughput::Elements(num_rows as u64));

    // From almost all duplicates to almost all unique.
    for distinct in [100, 10_000, 1_000_000] {
        let plays = generate_plays(num_rows, distinct);
        group.bench_with_input(BenchmarkId::new("distinct", distinct), &plays, |b, plays| {
            b.iter(|| plays.distinct().unwrap());
        });
        group.bench_with_input(BenchmarkId::new("build_time", distinct), &plays, |b, plays| {
            b.iter(|| build_time(plays).unwrap());
        });
    }
    group.finish();
}

// ============================================================================
// Criterion main
// ============================================================================

fn main() {
    let mut criterion = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .configure_from_args();

    bench_start_time(&mut criterion);
    bench_calendar(&mut criterion);
    bench_dedup(&mut criterion);

    criterion.final_summary();
}

//! Benchmarks for lap store maintenance
//!
//! Compares the incremental append path against a full rebuild over a season-sized log, and
//! times eviction, which prunes the log and rebuilds in one step.
//!
//! Platform: Cross-platform (synthetic lap log, CI-safe)

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pitboard::store::{Aggregates, LapStore};
use pitboard::test_utils::lap_at;
use pitboard::types::LapRecord;
use std::hint::black_box;

const MAX_LAP_MS: u32 = 60_000;

/// `sessions` sessions of 10 karts running 10 laps each, drivers rotating between karts.
fn season(sessions: usize) -> Vec<LapRecord> {
    let mut laps = Vec::with_capacity(sessions * 100);
    for session in 0..sessions {
        let session_id = format!("session-{session:03}");
        for kart in 0..10usize {
            let driver = format!("driver-{}", (kart + session) % 14);
            for lap in 1..=10u32 {
                let jitter = ((session * 31 + kart * 17 + lap as usize * 7) % 900) as u32;
                // Every 37th lap is an incident over the validity limit.
                let lap_ms = if (session + kart + lap as usize) % 37 == 0 { 62_000 } else { 29_000 + jitter };
                let at = (session * 10_000 + lap as usize * 60) as u64;
                laps.push(lap_at(&session_id, &(kart + 1).to_string(), &driver, lap, lap_ms, at));
            }
        }
    }
    laps
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_rebuild");
    for sessions in [14usize, 140] {
        let laps = season(sessions);
        group.throughput(Throughput::Elements(laps.len() as u64));
        group.bench_with_input(BenchmarkId::new("full", laps.len()), &laps, |b, laps| {
            b.iter(|| black_box(Aggregates::rebuild(black_box(laps), MAX_LAP_MS)))
        });
        group.bench_with_input(BenchmarkId::new("incremental", laps.len()), &laps, |b, laps| {
            b.iter(|| {
                let mut aggregates = Aggregates::default();
                for lap in laps {
                    aggregates.apply(black_box(lap), MAX_LAP_MS);
                }
                black_box(aggregates)
            })
        });
    }
    group.finish();
}

fn bench_append(c: &mut Criterion) {
    let laps = season(140);
    let extra = lap_at("session-999", "3", "driver-2", 11, 29_450, 9_999_999);

    c.bench_function("store_append_single_lap", |b| {
        b.iter_batched(
            || {
                let mut store = LapStore::new(MAX_LAP_MS, 100);
                for lap in &laps {
                    store.append(lap.clone());
                }
                store
            },
            |mut store| {
                store.append(black_box(extra.clone()));
                store
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_eviction(c: &mut Criterion) {
    let laps = season(141);

    c.bench_function("evict_one_session_of_141", |b| {
        b.iter_batched(
            || {
                let mut store = LapStore::new(MAX_LAP_MS, 100);
                for lap in &laps {
                    store.append(lap.clone());
                }
                store
            },
            |mut store| {
                let report = store.evict_old_sessions(140);
                black_box(report)
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_rebuild, bench_append, bench_eviction);
criterion_main!(benches);

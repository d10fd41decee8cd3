//! Benchmarks for reconciliation and the history it works on
//!
//! Run with: cargo bench --bench reconcile

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rebound::{
    Bounds, EntityState, HistoryLog, ReconciliationEngine, StepParams, Tick, TickState, Vec2,
};
use std::hint::black_box;

const PARAMS: StepParams = StepParams::new(1.0 / 60.0, 0.5, Bounds::new(10.0, 10.0));

/// A history of `len` predictions after tick 0, plus the matching live prediction.
fn predicted(len: usize) -> (HistoryLog, TickState) {
    let mut history = HistoryLog::new(len.max(1));
    let mut local = TickState::new(
        Tick::new(0),
        EntityState::new(Vec2::ZERO, Vec2::new(120.0, 90.0)),
    );
    for _ in 0..len {
        local = PARAMS.apply(&local);
        // Appends are strictly increasing, so this cannot fail.
        let _ = history.append(local);
    }
    (history, local)
}

fn bench_confirm(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile confirm");

    for len in [8usize, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (history, local) = predicted(len);
            let authoritative = *history.peek_oldest().unwrap_or(&local);
            b.iter_batched(
                || (ReconciliationEngine::new(), history.clone(), local),
                |(mut engine, mut history, mut local)| {
                    engine.on_authoritative(
                        black_box(&authoritative),
                        &mut history,
                        &mut local,
                        &PARAMS,
                    )
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_correct(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile correct");

    for len in [8usize, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (history, local) = predicted(len);
            let mut authoritative = *history.peek_oldest().unwrap_or(&local);
            authoritative.velocity = Vec2::new(-120.0, 90.0);
            b.iter_batched(
                || (ReconciliationEngine::new(), history.clone(), local),
                |(mut engine, mut history, mut local)| {
                    engine.on_authoritative(
                        black_box(&authoritative),
                        &mut history,
                        &mut local,
                        &PARAMS,
                    )
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("HistoryLog");

    group.bench_function("append_full", |b| {
        let (history, local) = predicted(256);
        b.iter_batched(
            || (history.clone(), PARAMS.apply(&local)),
            |(mut history, next)| history.append(black_box(next)),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("drop_older_than_half", |b| {
        let (history, _) = predicted(256);
        b.iter_batched(
            || history.clone(),
            |mut history| history.drop_older_than(black_box(Tick::new(128))),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_confirm, bench_correct, bench_history);
criterion_main!(benches);

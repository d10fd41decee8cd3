//! Benchmarks for the physics step
//!
//! Run with: cargo bench --bench physics

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rebound::__internal::{step, step_tick};
use rebound::{Bounds, EntityState, Tick, TickState, Vec2};
use std::hint::black_box;

const BOUNDS: Bounds = Bounds::new(10.0, 10.0);

fn bench_single_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    group.bench_function("free_motion", |b| {
        let state = EntityState::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        b.iter(|| step(black_box(state), black_box(1.0 / 60.0), 0.5, BOUNDS));
    });

    group.bench_function("wall_hit", |b| {
        let state = EntityState::new(Vec2::new(9.4, -9.4), Vec2::new(60.0, -60.0));
        b.iter(|| step(black_box(state), black_box(1.0 / 60.0), 0.5, BOUNDS));
    });

    group.finish();
}

fn bench_step_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_tick chain");

    for steps in [16u64, 64, 240] {
        group.throughput(Throughput::Elements(steps));
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            let start = TickState::new(
                Tick::new(0),
                EntityState::new(Vec2::ZERO, Vec2::new(120.0, 90.0)),
            );
            b.iter(|| {
                let mut state = black_box(start);
                for _ in 0..steps {
                    state = step_tick(&state, 1.0 / 60.0, 0.5, BOUNDS);
                }
                state
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_step, bench_step_chain);
criterion_main!(benches);

//! Workload throughput benchmark
//!
//! Compares dynamic pull (`SingleQueue`) against static stride partitioning
//! (`MultiQueue`) for tiny, uniform tasks and for tasks of uneven cost.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use batchpool::prelude::*;

const THREADS: usize = 4;

/// A workload of `len` tasks. Task `i` spins for `cost(i)` iterations.
fn workload(len: usize, sink: &Arc<AtomicU64>, cost: fn(usize) -> u64) -> Workload {
    (0..len)
        .map(|index| {
            let sink = Arc::clone(sink);
            let spins = cost(index);
            task(move || {
                let mut acc = 0u64;
                for i in 0..spins {
                    acc = acc.wrapping_add(black_box(i));
                }
                sink.fetch_add(acc, Ordering::Relaxed);
            })
        })
        .collect()
}

fn uniform(_: usize) -> u64 {
    64
}

fn uneven(index: usize) -> u64 {
    if index % 8 == 0 {
        16_384
    } else {
        64
    }
}

fn bench_strategies(c: &mut Criterion, name: &str, cost: fn(usize) -> u64) {
    let mut group = c.benchmark_group(name);
    let sink = Arc::new(AtomicU64::new(0));

    for len in [64, 1024] {
        group.throughput(Throughput::Elements(len as u64));

        let mut single = ThreadPool::new(PoolConfig::new(THREADS)).unwrap();
        group.bench_with_input(BenchmarkId::new("single_queue", len), &len, |b, &len| {
            b.iter_batched(
                || workload(len, &sink, cost),
                |tasks| single.submit(tasks).wait().unwrap(),
                criterion::BatchSize::SmallInput,
            )
        });

        let mut multi = ThreadPool::multi_queue(PoolConfig::new(THREADS)).unwrap();
        group.bench_with_input(BenchmarkId::new("multi_queue", len), &len, |b, &len| {
            b.iter_batched(
                || workload(len, &sink, cost),
                |tasks| multi.submit(tasks).wait().unwrap(),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_uniform(c: &mut Criterion) {
    bench_strategies(c, "workload/uniform", uniform);
}

fn bench_uneven(c: &mut Criterion) {
    bench_strategies(c, "workload/uneven", uneven);
}

criterion_group!(benches, bench_uniform, bench_uneven);
criterion_main!(benches);

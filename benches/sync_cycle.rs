//! Performance benchmarks for sync cycles against the in-process remote

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use eventsync::storage::EntityStore;
use eventsync::sync::{InMemoryRemote, SyncCoordinator};
use eventsync::types::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn seeded_local(count: usize) -> (EntityStore, SyncCoordinator) {
    let store = EntityStore::open_in_memory().unwrap();
    for i in 0..count {
        store
            .insert(&Guest::new(format!("Guest {}", i), (i % 4) as i32, "Groove"))
            .unwrap();
    }
    let coordinator = SyncCoordinator::new(
        store.clone(),
        Arc::new(InMemoryRemote::new()),
        SyncConfig::default(),
    );
    (store, coordinator)
}

fn seeded_remote(count: usize) -> SyncCoordinator {
    let remote = InMemoryRemote::new();
    for i in 0..count {
        let payload = serde_json::to_value(Guest::new(format!("Guest {}", i), 1, "Groove")).unwrap();
        remote
            .put(Collection::Guests, payload, 1_000 + i as i64)
            .unwrap();
    }
    SyncCoordinator::new(
        EntityStore::open_in_memory().unwrap(),
        Arc::new(remote),
        SyncConfig::default(),
    )
}

fn bench_push(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("push_cycle");

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || seeded_local(size),
                |(_store, coordinator)| {
                    rt.block_on(coordinator.run_cycle(black_box(Collection::Guests)))
                        .unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_pull(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("pull_cycle");

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || seeded_remote(size),
                |coordinator| {
                    rt.block_on(coordinator.run_cycle(black_box(Collection::Guests)))
                        .unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_idle_cycle(c: &mut Criterion) {
    let rt = runtime();
    let (_store, coordinator) = seeded_local(1000);
    rt.block_on(coordinator.run_cycle(Collection::Guests)).unwrap();

    c.bench_function("idle_cycle_1000", |b| {
        b.iter(|| {
            rt.block_on(coordinator.run_cycle(black_box(Collection::Guests)))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_push, bench_pull, bench_idle_cycle);
criterion_main!(benches);

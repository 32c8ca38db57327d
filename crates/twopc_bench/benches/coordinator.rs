//! Coordinator benchmarks: full commit and abort round trips.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use twopc_bench::participants;
use twopc_core::{Coordinator, CoordinatorConfig, Participant};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn commit_once(rt: &Runtime, coordinator: &Coordinator, participants: &[Arc<dyn Participant>]) {
    let txid = coordinator.begin();
    for p in participants {
        coordinator.enlist(txid, Arc::clone(p)).unwrap();
    }
    let report = rt.block_on(coordinator.commit_transaction(txid)).unwrap();
    black_box(report);
}

/// Benchmark commits with an in-memory log.
fn bench_memory_commit(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("commit_memory");

    for count in [1, 3, 8].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let coordinator = Coordinator::in_memory(CoordinatorConfig::default()).unwrap();
            let participants = participants(count, false);
            b.iter(|| commit_once(&rt, &coordinator, &participants));
        });
    }

    group.finish();
}

/// Benchmark the abort path (one participant votes no).
fn bench_memory_abort(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("abort_memory");

    for count in [1, 3, 8].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let coordinator = Coordinator::in_memory(CoordinatorConfig::default()).unwrap();
            let participants = participants(count, true);
            b.iter(|| commit_once(&rt, &coordinator, &participants));
        });
    }

    group.finish();
}

/// Benchmark commits against a file log, with and without fsync.
fn bench_file_commit(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("commit_file");
    group.sample_size(20);

    for sync in [false, true].iter() {
        let name = if *sync { "fsync" } else { "flush" };
        group.bench_function(name, |b| {
            let temp_dir = TempDir::new().unwrap();
            let config = CoordinatorConfig::default().sync_on_write(*sync);
            let coordinator = Coordinator::open(temp_dir.path(), config).unwrap();
            let participants = participants(3, false);
            b.iter(|| commit_once(&rt, &coordinator, &participants));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_memory_commit,
    bench_memory_abort,
    bench_file_commit
);
criterion_main!(benches);

//! Decision log benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use twopc_core::{
    Decision, DecisionLog, Outcome, ParticipantId, StorageDecisionLog, TransactionId,
};
use twopc_storage::InMemoryBackend;

fn ids(count: usize) -> Vec<ParticipantId> {
    (0..count)
        .map(|i| ParticipantId::new(format!("participant-{i}")).unwrap())
        .collect()
}

/// Benchmark decision appends to memory and file backends.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("decision_append");
    let participants = ids(3);

    group.throughput(Throughput::Elements(1));
    group.bench_function("memory", |b| {
        let log = StorageDecisionLog::new(Box::new(InMemoryBackend::new()), false).unwrap();
        b.iter(|| {
            log.record(black_box(TransactionId::new()), Decision::Commit, &participants)
                .unwrap();
        });
    });

    group.sample_size(30);
    for sync in [false, true].iter() {
        let name = if *sync { "file_fsync" } else { "file_flush" };
        group.bench_function(name, |b| {
            let temp_dir = TempDir::new().unwrap();
            let log = StorageDecisionLog::open_dir(temp_dir.path(), *sync).unwrap();
            b.iter(|| {
                log.record(black_box(TransactionId::new()), Decision::Commit, &participants)
                    .unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark replay and compaction of logs of various sizes.
fn bench_compact(c: &mut Criterion) {
    let mut group = c.benchmark_group("decision_compact");
    let participants = ids(3);

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_with_setup(
                || {
                    let log = StorageDecisionLog::in_memory();
                    for i in 0..count {
                        let txid = TransactionId::new();
                        log.record(txid, Decision::Commit, &participants).unwrap();
                        if i % 2 == 0 {
                            log.mark_complete(txid, Outcome::Committed).unwrap();
                        }
                    }
                    log
                },
                |log| black_box(log.compact().unwrap()),
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_compact);
criterion_main!(benches);

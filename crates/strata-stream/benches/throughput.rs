//! Benchmarks for append and group-read throughput
//!
//! Run with: cargo bench --bench throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use strata_core::{EngineConfig, EntryId, Fields, GroupStart, TrimMode, TrimPolicy};
use strata_file_log::{FileBackend, FileLogConfig};
use strata_stream::{ReadFrom, StreamEngine};

fn payload(n: u64) -> Fields {
    Fields::new([
        ("event", "order".to_string()),
        ("orderId", n.to_string()),
        ("amount", format!("{}.00", n % 1000)),
    ])
    .unwrap()
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memory", |b| {
        let engine = StreamEngine::in_memory().unwrap();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            black_box(engine.append("bench", payload(n)).unwrap());
        });
    });

    group.bench_function("file", |b| {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = FileLogConfig::new(temp_dir.path()).with_flush_on_append(false);
        let backend = Arc::new(FileBackend::open(config).unwrap());
        let engine = StreamEngine::open(backend, EngineConfig::default()).unwrap();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            black_box(engine.append("bench", payload(n)).unwrap());
        });
    });

    group.finish();
}

fn bench_group_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_group");

    for batch in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter_batched(
                || {
                    let engine = StreamEngine::in_memory().unwrap();
                    for n in 0..1_000 {
                        engine.append("bench", payload(n)).unwrap();
                    }
                    engine
                        .create_group("bench", "g", GroupStart::BEGINNING)
                        .unwrap();
                    engine
                },
                |engine| {
                    loop {
                        let entries = engine
                            .read_group("bench", "g", "c", ReadFrom::New, batch)
                            .unwrap();
                        if entries.is_empty() {
                            break;
                        }
                        let ids: Vec<EntryId> = entries.iter().map(|e| e.id).collect();
                        engine.ack_many("bench", "g", &ids).unwrap();
                    }
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("trim");

    for mode in [TrimMode::Exact, TrimMode::Approximate] {
        group.bench_function(format!("{:?}", mode), |b| {
            b.iter_batched(
                || {
                    let engine = StreamEngine::in_memory().unwrap();
                    for n in 0..5_000 {
                        engine.append("bench", payload(n)).unwrap();
                    }
                    engine
                },
                |engine| {
                    black_box(
                        engine
                            .trim("bench", TrimPolicy::MaxLength(1_000), mode)
                            .unwrap(),
                    );
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_group_read, bench_trim);
criterion_main!(benches);

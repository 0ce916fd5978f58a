//! Throughput of the worker pool against the rayon batch processor on a
//! CPU-bound artifact analysis workload.
//!
//! The pool pays for thread start-up on every call, so small inputs favor
//! the batch processor; these benchmarks show where the curves cross.

use blockaudit::analyzers::AnalyzerRegistry;
use blockaudit::batch::BatchProcessor;
use blockaudit::config::{AnalysisSettings, ParallelConfig, WorkerPoolConfig};
use blockaudit::core::{Artifact, BlockSchema, FieldSchema};
use blockaudit::pool::WorkerPool;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

fn blocks(count: usize) -> Vec<Artifact> {
    (0..count)
        .map(|i| {
            let fields = (0..12)
                .map(|f| {
                    let field = FieldSchema::new(format!("field_{f}"), "text");
                    if f % 4 == 0 {
                        field.with_fields(vec![FieldSchema::new("nested", "text").required()])
                    } else {
                        field
                    }
                })
                .collect();
            Artifact::Block(BlockSchema::new(format!("block-{i}"), fields))
        })
        .collect()
}

fn benchmark_worker_pool(c: &mut Criterion) {
    let registry = Arc::new(AnalyzerRegistry::new(&AnalysisSettings::default()));
    let mut group = c.benchmark_group("worker_pool");

    for size in [16, 128, 512] {
        let input = blocks(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            let registry = Arc::clone(&registry);
            let pool = WorkerPool::new(WorkerPoolConfig::default(), move |artifact: Artifact| {
                Ok::<_, String>(registry.analyze_artifact(&artifact))
            });
            b.iter(|| black_box(pool.process_all(input.clone()).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_batch_processor(c: &mut Criterion) {
    let registry = Arc::new(AnalyzerRegistry::new(&AnalysisSettings::default()));
    let mut group = c.benchmark_group("batch_processor");

    for size in [16, 128, 512] {
        let input = blocks(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            let registry = Arc::clone(&registry);
            let processor = BatchProcessor::new(
                ParallelConfig {
                    window_delay_ms: 0,
                    ..ParallelConfig::default()
                },
                move |batch: Vec<Artifact>| {
                    Ok::<_, String>(
                        batch
                            .iter()
                            .map(|artifact| registry.analyze_artifact(artifact))
                            .collect(),
                    )
                },
            )
            .unwrap();
            b.iter(|| black_box(processor.process(input.clone()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_worker_pool, benchmark_batch_processor);
criterion_main!(benches);

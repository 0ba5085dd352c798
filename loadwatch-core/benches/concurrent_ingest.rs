use loadwatch_core::{current_timestamp_ms, IngestGateway, NodeRegistry, Sample};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

fn gateway(nodes: usize) -> IngestGateway {
    let registry = Arc::new(NodeRegistry::default());
    for i in 0..nodes {
        registry.register(format!("node-{}", i));
    }
    IngestGateway::new(registry)
}

/// Benchmark single-threaded ingest latency (hot path)
fn bench_ingest(c: &mut Criterion) {
    let gw = gateway(1);
    let now = current_timestamp_ms();

    c.bench_function("ingest", |b| {
        b.iter(|| {
            let _ = gw.ingest_at(black_box(Sample::new("node-0", now, 42.0)), now);
        });
    });
}

/// Benchmark concurrent ingest where every thread owns its node (no contention)
fn bench_concurrent_ingest_distinct_nodes(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_ingest_distinct_nodes");

    for thread_count in [1, 2, 4, 8, 16].iter() {
        group.throughput(Throughput::Elements(*thread_count as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::new("threads", thread_count),
            thread_count,
            |b, &thread_count| {
                let gw = gateway(thread_count);
                let now = current_timestamp_ms();

                b.iter(|| {
                    let handles: Vec<_> = (0..thread_count)
                        .map(|t| {
                            let gw = gw.clone();
                            let node = format!("node-{}", t);
                            thread::spawn(move || {
                                for _ in 0..1000 {
                                    let _ = gw.ingest_at(Sample::new(node.as_str(), now, 42.0), now);
                                }
                            })
                        })
                        .collect();

                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark concurrent ingest into a single node (high contention)
fn bench_concurrent_ingest_same_node(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_ingest_same_node");

    for thread_count in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*thread_count as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(thread_count),
            thread_count,
            |b, &thread_count| {
                let gw = gateway(1);
                let now = current_timestamp_ms();

                b.iter(|| {
                    let handles: Vec<_> = (0..thread_count)
                        .map(|_| {
                            let gw = gw.clone();
                            thread::spawn(move || {
                                for _ in 0..1000 {
                                    let _ = gw.ingest_at(Sample::new("node-0", now, 42.0), now);
                                }
                            })
                        })
                        .collect();

                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_ingest,
    bench_concurrent_ingest_distinct_nodes,
    bench_concurrent_ingest_same_node
);
criterion_main!(benches);

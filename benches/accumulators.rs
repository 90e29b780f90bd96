//! Criterion microbenchmarks for the streaming accumulators.
//!
//! Run with: `cargo bench --bench accumulators`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbbench::job::JobStats;
use dbbench::stats::{StreamingHistogram, StreamingSample, StreamingStats};
use dbbench::types::Outcome;
use std::time::Duration;
use tokio::time::Instant;

fn bench_streaming_stats(c: &mut Criterion) {
    c.bench_function("streaming_stats_add", |b| {
        let mut stats = StreamingStats::new();
        let mut x = 0.0f64;
        b.iter(|| {
            x += 0.37;
            stats.add(black_box(x));
        });
    });
}

fn bench_histogram(c: &mut Criterion) {
    c.bench_function("streaming_histogram_add", |b| {
        let mut histogram = StreamingHistogram::new();
        let mut v = 1u64;
        b.iter(|| {
            v = v.wrapping_mul(6364136223846793005).wrapping_add(1);
            histogram.add(black_box(v));
        });
    });
}

fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_sample_add");
    for capacity in [256usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
            let mut sample = StreamingSample::with_seed(cap, 42);
            let mut x = 0.0f64;
            b.iter(|| {
                x += 1.0;
                sample.add(black_box(x));
            });
        });
    }
    group.finish();
}

fn bench_job_record(c: &mut Criterion) {
    c.bench_function("job_stats_record", |b| {
        let stats = JobStats::new("bench");
        stats.start(Instant::now());
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            stats.record(black_box(Duration::from_micros(n % 5_000)), &Outcome::Success);
        });
    });
}

criterion_group!(
    benches,
    bench_streaming_stats,
    bench_histogram,
    bench_sample,
    bench_job_record
);
criterion_main!(benches);

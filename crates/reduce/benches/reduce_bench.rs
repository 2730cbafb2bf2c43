use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use reduce::{normalize_coordinates, reduce_joint};

/// Deterministic pseudo-embeddings shaped like model hidden states.
fn synthetic_rows(n: usize, dim: usize, seed: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| {
            (0..dim)
                .map(|j| (((i + seed) * 31 + j * 17) as f32 * 0.013).sin())
                .collect()
        })
        .collect()
}

/// Joint reduction at typical request sizes for a 2048-wide model.
fn bench_reduce_joint(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce_joint");
    let dim = 2048;

    for tokens in [16usize, 64, 160].iter() {
        let input = synthetic_rows(tokens / 2, dim, 0);
        let output = synthetic_rows(tokens - tokens / 2, dim, 7);

        group.throughput(Throughput::Elements(*tokens as u64));
        group.bench_function(format!("tokens_{}", tokens), |b| {
            b.iter(|| reduce_joint(black_box(&input), black_box(&output)).unwrap());
        });
    }

    group.finish();
}

/// Largest requests the server accepts: a 2000-character prompt plus a long reply.
fn bench_reduce_request_ceiling(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce_joint_ceiling");
    group.sample_size(10);
    let dim = 2048;

    for tokens in [500usize, 1000].iter() {
        let input = synthetic_rows(tokens / 2, dim, 0);
        let output = synthetic_rows(tokens - tokens / 2, dim, 7);
        group.bench_function(format!("tokens_{}", tokens), |b| {
            b.iter(|| reduce_joint(black_box(&input), black_box(&output)).unwrap());
        });
    }

    group.finish();
}

/// Scatter-matrix path: more rows than columns.
fn bench_reduce_narrow(c: &mut Criterion) {
    let input = synthetic_rows(200, 32, 0);
    let output = synthetic_rows(200, 32, 3);
    c.bench_function("reduce_joint_narrow_400x32", |b| {
        b.iter(|| reduce_joint(black_box(&input), black_box(&output)).unwrap());
    });
}

fn bench_normalize(c: &mut Criterion) {
    let points: Vec<[f64; 3]> = (0..1000)
        .map(|i| {
            let t = i as f64 * 0.01;
            [t.sin(), t.cos(), t * 0.5]
        })
        .collect();
    c.bench_function("normalize_1000", |b| {
        b.iter(|| normalize_coordinates(black_box(&points)));
    });
}

criterion_group!(
    benches,
    bench_reduce_joint,
    bench_reduce_request_ceiling,
    bench_reduce_narrow,
    bench_normalize
);
criterion_main!(benches);

//! Benchmarks for distance kernels and matrix-vector multiply.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use tessera_core::{dot_product, l2_distance_squared, Matrix};

/// Codebook spans are short, rotations and whole vectors are long.
const DIMS: [usize; 6] = [2, 8, 16, 128, 768, 1536];

fn random_vector(dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_l2_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_distance_squared");

    for dim in DIMS.iter() {
        let a = random_vector(*dim, 1);
        let b = random_vector(*dim, 2);

        group.throughput(Throughput::Elements(*dim as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| l2_distance_squared(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_dot_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot_product");

    for dim in DIMS.iter() {
        let a = random_vector(*dim, 1);
        let b = random_vector(*dim, 2);

        group.throughput(Throughput::Elements(*dim as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| dot_product(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_matrix_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix_mul_vec");

    for dim in [64, 128, 384].iter() {
        let matrix = Matrix::identity(*dim);
        let v = random_vector(*dim, 3);
        let mut out = vec![0.0f32; *dim];

        group.throughput(Throughput::Elements((*dim * *dim) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| matrix.mul_vec_into(black_box(&v), &mut out))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_l2_distance, bench_dot_product, bench_matrix_vector);
criterion_main!(benches);

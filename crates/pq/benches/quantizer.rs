//! Benchmarks for encoding, decoding and asymmetric scoring.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand_distr::Normal;
use tessera_pq::{PqParams, ProductQuantizer};

const TRAINING_SIZE: usize = 2_000;

fn gaussian_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0f32, 1.0).unwrap();
    (0..n)
        .map(|_| (0..dim).map(|_| normal.sample(&mut rng)).collect())
        .collect()
}

fn trained(dim: usize, m: usize) -> (ProductQuantizer, Vec<Vec<f32>>) {
    let vectors = gaussian_vectors(TRAINING_SIZE, dim, 42);
    let params = PqParams::new(m).with_kmeans_iterations(5).with_seed(7);
    let pq = ProductQuantizer::train(&vectors, &params).unwrap();
    (pq, vectors)
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pq_encode");

    for &(dim, m) in &[(64, 8), (128, 16), (384, 48)] {
        let (pq, vectors) = trained(dim, m);
        let mut code = vec![0u8; m];

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("dim", dim), &dim, |bench, _| {
            bench.iter(|| pq.encode_into(black_box(&vectors[0]), &mut code))
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pq_decode");

    for &(dim, m) in &[(64, 8), (128, 16), (384, 48)] {
        let (pq, vectors) = trained(dim, m);
        let code = pq.encode(&vectors[0]).unwrap();
        let mut target = vec![0.0f32; dim];

        group.bench_with_input(BenchmarkId::new("dim", dim), &dim, |bench, _| {
            bench.iter(|| {
                pq.decode_into(black_box(&code), &mut target).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_decoded_dot_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("pq_decoded_dot_product");

    for &(dim, m) in &[(64, 8), (128, 16), (384, 48)] {
        let (pq, vectors) = trained(dim, m);
        let codes: Vec<Vec<u8>> = vectors.iter().take(1_000).map(|v| pq.encode(v).unwrap()).collect();
        let query = gaussian_vectors(1, dim, 99).remove(0);

        group.throughput(Throughput::Elements(codes.len() as u64));
        group.bench_with_input(BenchmarkId::new("direct", dim), &dim, |bench, _| {
            bench.iter(|| {
                let mut total = 0.0f32;
                for code in &codes {
                    total += pq.decoded_dot_product(code, black_box(&query)).unwrap();
                }
                total
            })
        });

        group.bench_with_input(BenchmarkId::new("scorer", dim), &dim, |bench, _| {
            bench.iter(|| {
                let scorer = pq.scorer(black_box(&query)).unwrap();
                codes.iter().map(|code| scorer.try_score(code).unwrap()).sum::<f32>()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_decoded_dot_product);
criterion_main!(benches);

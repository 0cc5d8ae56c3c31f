//! Benchmarks for product-quantization encoding.
//!
//! Groups:
//!   encode  - accelerator vs direct path throughput vs vector width
//!   batch   - accelerator path vs batch size at a fixed width
//!
//! Run with:
//!   cargo bench -p nes-index --bench pq_encode
//!   cargo bench -p nes-index --bench pq_encode -- encode-accel

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nes_index::{DevicePolicy, KMeansConfig, PqEncoder, PqParams};
use rand::{rngs::StdRng, Rng, SeedableRng};

const NUM_VECTORS: usize = 4096;
const NUM_CLUSTERS: usize = 64;
const SUBSPACE_WIDTH: usize = 8;
const DIMS: &[usize] = &[32, 128, 512];
const BATCH_SIZES: &[usize] = &[64, 512, 4096];

fn make_rng() -> StdRng {
    StdRng::seed_from_u64(0xC0DE)
}

fn random_vectors(rng: &mut StdRng, n: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn trained_encoder(dim: usize, vectors: &[Vec<f32>]) -> PqEncoder {
    let params = PqParams::new(dim, SUBSPACE_WIDTH, NUM_CLUSTERS).expect("valid params");
    let mut encoder = PqEncoder::new(params, DevicePolicy::unbound())
        .expect("context acquired")
        .with_kmeans_config(KMeansConfig {
            num_iters: 5,
            seed: Some(7),
            ..Default::default()
        });
    encoder.train(vectors).expect("training succeeds");
    encoder
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for &dim in DIMS {
        let mut rng = make_rng();
        let vectors = random_vectors(&mut rng, NUM_VECTORS, dim);
        let encoder = trained_encoder(dim, &vectors);

        group.throughput(Throughput::Bytes((NUM_VECTORS * dim * 4) as u64));
        group.bench_with_input(BenchmarkId::new("encode-accel", dim), &dim, |b, _| {
            b.iter(|| black_box(encoder.encode_accelerated(&vectors, 1024).expect("encode")));
        });
        group.bench_with_input(BenchmarkId::new("encode-direct", dim), &dim, |b, _| {
            b.iter(|| black_box(encoder.encode_direct(&vectors).expect("encode")));
        });
    }
    group.finish();
}

fn bench_batch_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let dim = 128;
    let mut rng = make_rng();
    let vectors = random_vectors(&mut rng, NUM_VECTORS, dim);
    let encoder = trained_encoder(dim, &vectors);

    group.throughput(Throughput::Elements(NUM_VECTORS as u64));
    for &batch_size in BATCH_SIZES {
        group.bench_with_input(
            BenchmarkId::new("batch-accel", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    black_box(
                        encoder
                            .encode_accelerated(&vectors, batch_size)
                            .expect("encode"),
                    )
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_batch_size);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, Criterion};
use nes_distance::{argmin, squared_euclidean};

fn distance_metrics(c: &mut Criterion) {
    c.bench_function("squared_euclidean", |b| {
        let x: Vec<f32> = (0..768).map(|_| rand::random()).collect();
        let y: Vec<f32> = (0..768).map(|_| rand::random()).collect();
        b.iter(|| std::hint::black_box(squared_euclidean(&x, &y)));
    });

    c.bench_function("nearest_of_256_subvectors", |b| {
        let query: Vec<f32> = (0..8).map(|_| rand::random()).collect();
        let centroids: Vec<f32> = (0..256 * 8).map(|_| rand::random()).collect();
        b.iter(|| {
            std::hint::black_box(argmin(
                centroids
                    .chunks_exact(8)
                    .map(|centroid| squared_euclidean(&query, centroid)),
            ))
        });
    });
}

criterion_group!(benches, distance_metrics,);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use honest_forest::data::{Matrix, Observations};
use honest_forest::prediction::{LocalLinearConfig, LocalLinearStrategy, RidgePenalty};
use honest_forest::sampler::{RandomSampler, SamplingOptions};
use std::collections::BTreeSet;

mod utils;
use utils::{create_data, neighbor_weights};

pub fn sampler_benchmarks(c: &mut Criterion) {
    let mut sampler = RandomSampler::new(0, SamplingOptions::uniform());
    let skip: BTreeSet<usize> = [3, 17, 256].into_iter().collect();

    c.bench_function("sample 100k half", |b| b.iter(|| sampler.sample(black_box(100_000), black_box(0.5))));
    c.bench_function("draw_simple 10 of 10k", |b| {
        b.iter(|| sampler.draw_simple(black_box(10_000), black_box(&skip), black_box(10)))
    });
    c.bench_function("draw_knuth 10 of 10k", |b| {
        b.iter(|| sampler.draw_knuth(black_box(10_000), black_box(&skip), black_box(10)))
    });

    let weighted = SamplingOptions::new(vec![1.0; 10_000], &[], 0).unwrap();
    let mut weighted_sampler = RandomSampler::new(0, weighted);
    c.bench_function("weighted sample 10k tenth", |b| {
        b.iter(|| weighted_sampler.sample(black_box(10_000), black_box(0.1)))
    });
}

pub fn local_linear_benchmarks(c: &mut Criterion) {
    let n_samples = 5_000;
    let n_features = 10;
    let (data, y) = create_data(n_samples, n_features);
    let train = Matrix::new(&data, n_samples, n_features).unwrap();
    let test = Matrix::new(&data[..], n_samples, n_features).unwrap();
    let obs = Observations::from_outcome(y);
    let weights = neighbor_weights(n_samples, 500, 7);
    let samples_by_tree: Vec<Vec<usize>> = weights.keys().copied().collect::<Vec<_>>().chunks(5).map(|c| c.to_vec()).collect();

    let config = LocalLinearConfig {
        lambdas: vec![0.0, 0.01, 0.1, 1.0],
        penalty: RidgePenalty::Normalized,
        ..LocalLinearConfig::default()
    };
    let strategy = LocalLinearStrategy::new(&train, &test, config).unwrap();

    c.bench_function("local linear predict 4 lambdas", |b| {
        b.iter(|| strategy.predict(black_box(0), black_box(&weights), black_box(&obs)))
    });
    c.bench_function("local linear variance", |b| {
        b.iter(|| strategy.compute_variance(black_box(0), black_box(&weights), black_box(&samples_by_tree), black_box(&obs)))
    });
}

criterion_group!(benches, sampler_benchmarks, local_linear_benchmarks);
criterion_main!(benches);

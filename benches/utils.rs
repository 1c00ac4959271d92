#![allow(dead_code)]
use hashbrown::HashMap;
use rand::distributions::Uniform;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub(crate) fn create_data(n_samples: usize, n_features: usize) -> (Vec<f64>, Vec<f64>) {
    // reproducible seed
    let mut rng = StdRng::seed_from_u64(1903);

    let feature_distribution = Uniform::new(0.0, 1.0);
    let noise_distribution = Uniform::new(-1.0, 1.0);
    let coefficient_distribution = Uniform::new(-1.0, 1.0);

    let mut feature_space: Vec<Vec<f64>> = vec![Vec::with_capacity(n_samples); n_features];
    let mut target_variable: Vec<f64> = Vec::with_capacity(n_samples);

    // random coefficients for the linear model
    let coefficients: Vec<f64> = (0..n_features).map(|_| rng.sample(coefficient_distribution)).collect();

    for _ in 0..n_samples {
        let mut linear = 0.0;
        for (j, column) in feature_space.iter_mut().enumerate() {
            let v = rng.sample(feature_distribution);
            column.push(v);
            linear += v * coefficients[j];
        }
        target_variable.push(linear + rng.sample(noise_distribution));
    }

    // flatten into column-major
    let mut data = Vec::with_capacity(n_samples * n_features);
    for col in feature_space {
        data.extend(col);
    }

    (data, target_variable)
}

// neighbor_weights
//
// Normalized random weights over a random subset of the training samples.
pub(crate) fn neighbor_weights(n_samples: usize, n_neighbors: usize, seed: u64) -> HashMap<usize, f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids: Vec<usize> = (0..n_samples).collect();
    ids.shuffle(&mut rng);
    ids.truncate(n_neighbors);
    let raw: Vec<f64> = ids.iter().map(|_| rng.gen::<f64>() + 0.01).collect();
    let total: f64 = raw.iter().sum();
    ids.into_iter().zip(raw).map(|(i, w)| (i, w / total)).collect()
}

//! Sampler
//!
//! Draws bagging, honesty and cluster subsets without replacement. One
//! [`RandomSampler`] is created per worker with its own seed, so tree-parallel
//! training never shares generator state.
use crate::config::ConfigIO;
use crate::errors::ForestError;
use hashbrown::HashMap;
use log::debug;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::Poisson;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Sampling configuration, fixed for a whole training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Unnormalized per-sample weights, empty for uniform sampling.
    sample_weights: Vec<f64>,
    /// Contiguous cluster id to the rows it contains, empty when clustering is off.
    cluster_map: HashMap<usize, Vec<usize>>,
    /// Rows drawn from every sampled cluster.
    samples_per_cluster: usize,
}

impl SamplingOptions {
    /// Build sampling options.
    ///
    /// * `sample_weights` - Per-sample weights, or empty for uniform draws.
    /// * `clusters` - Cluster label of every row, or empty to disable clustering.
    ///   Labels are relabelled to contiguous ids in increasing label order.
    /// * `samples_per_cluster` - Rows drawn per sampled cluster; `0` uses the
    ///   size of the smallest cluster.
    pub fn new(sample_weights: Vec<f64>, clusters: &[usize], samples_per_cluster: usize) -> Result<Self, ForestError> {
        if let Some(w) = sample_weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ForestError::InvalidArgument(format!(
                "sample weights must be finite and non-negative, found {}",
                w
            )));
        }
        if !sample_weights.is_empty() && sample_weights.iter().all(|w| *w == 0.0) {
            return Err(ForestError::InvalidArgument("sample weights are all zero".to_string()));
        }

        let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row, label) in clusters.iter().enumerate() {
            by_label.entry(*label).or_default().push(row);
        }
        let cluster_map: HashMap<usize, Vec<usize>> = by_label.into_values().enumerate().collect();

        let samples_per_cluster = if samples_per_cluster == 0 {
            cluster_map.values().map(|rows| rows.len()).min().unwrap_or(0)
        } else {
            samples_per_cluster
        };

        Ok(SamplingOptions {
            sample_weights,
            cluster_map,
            samples_per_cluster,
        })
    }

    /// Uniform, unclustered sampling.
    pub fn uniform() -> Self {
        SamplingOptions::default()
    }

    pub fn clustering_enabled(&self) -> bool {
        !self.cluster_map.is_empty()
    }

    pub fn num_clusters(&self) -> usize {
        self.cluster_map.len()
    }

    pub fn sample_weights(&self) -> &[f64] {
        &self.sample_weights
    }

    pub fn cluster_map(&self) -> &HashMap<usize, Vec<usize>> {
        &self.cluster_map
    }

    pub fn samples_per_cluster(&self) -> usize {
        self.samples_per_cluster
    }
}

impl ConfigIO for SamplingOptions {}

fn validate_fraction(sample_fraction: f64) -> Result<(), ForestError> {
    if !sample_fraction.is_finite() || sample_fraction <= 0.0 {
        return Err(ForestError::InvalidArgument(format!(
            "sample fraction must be positive, found {}",
            sample_fraction
        )));
    }
    Ok(())
}

fn validate_draw(max: usize, skip: &BTreeSet<usize>, num_samples: usize) -> Result<usize, ForestError> {
    if let Some(s) = skip.iter().find(|s| **s >= max) {
        return Err(ForestError::InvalidArgument(format!(
            "skipped index {} is outside [0, {})",
            s, max
        )));
    }
    let available = max - skip.len();
    if num_samples > available {
        return Err(ForestError::InvalidArgument(format!(
            "cannot draw {} distinct indices from {} candidates",
            num_samples, available
        )));
    }
    Ok(available)
}

/// Map a position among the non-skipped indices to the index itself.
#[inline]
fn shift_past_skipped(mut value: usize, skip: &BTreeSet<usize>) -> usize {
    // Ascending order makes every earlier shift visible to later comparisons.
    for s in skip {
        if value >= *s {
            value += 1;
        }
    }
    value
}

pub struct RandomSampler {
    rng: StdRng,
    options: SamplingOptions,
}

impl RandomSampler {
    pub fn new(seed: u64, options: SamplingOptions) -> Self {
        RandomSampler {
            rng: StdRng::seed_from_u64(seed),
            options,
        }
    }

    pub fn clustering_enabled(&self) -> bool {
        self.options.clustering_enabled()
    }

    /// Sample cluster ids when clustering is enabled, row indices otherwise.
    pub fn sample_clusters(&mut self, num_rows: usize, sample_fraction: f64) -> Result<Vec<usize>, ForestError> {
        let num_samples = if self.options.clustering_enabled() {
            self.options.num_clusters()
        } else {
            num_rows
        };
        self.sample(num_samples, sample_fraction)
    }

    /// Draw `floor(num_samples * sample_fraction)` distinct indices from
    /// `0..num_samples`, uniformly or proportionally to the sample weights.
    pub fn sample(&mut self, num_samples: usize, sample_fraction: f64) -> Result<Vec<usize>, ForestError> {
        validate_fraction(sample_fraction)?;
        if sample_fraction > 1.0 {
            return Err(ForestError::InvalidArgument(format!(
                "sample fraction must be at most 1, found {}",
                sample_fraction
            )));
        }
        let num_samples_inbag = (num_samples as f64 * sample_fraction).floor() as usize;

        if self.options.sample_weights.is_empty() {
            let mut samples: Vec<usize> = (0..num_samples).collect();
            samples.shuffle(&mut self.rng);
            samples.truncate(num_samples_inbag);
            Ok(samples)
        } else {
            let weights = std::mem::take(&mut self.options.sample_weights);
            let result = self.draw_weighted(num_samples, num_samples_inbag, &weights);
            self.options.sample_weights = weights;
            result
        }
    }

    /// Shuffle `samples` and keep the first `ceil(len * sample_fraction)` of them.
    pub fn subsample(&mut self, samples: &[usize], sample_fraction: f64) -> Result<Vec<usize>, ForestError> {
        self.subsample_with_oob(samples, sample_fraction).map(|(inbag, _)| inbag)
    }

    /// Split `samples` into a random subsample of `ceil(len * sample_fraction)`
    /// ids and its out-of-bag complement.
    pub fn subsample_with_oob(
        &mut self,
        samples: &[usize],
        sample_fraction: f64,
    ) -> Result<(Vec<usize>, Vec<usize>), ForestError> {
        validate_fraction(sample_fraction)?;
        let mut shuffled = samples.to_vec();
        shuffled.shuffle(&mut self.rng);

        let subsample_size = ((samples.len() as f64 * sample_fraction).ceil() as usize).min(samples.len());
        let oob = shuffled.split_off(subsample_size);
        Ok((shuffled, oob))
    }

    /// Draw `samples_per_cluster` rows from each of the given clusters.
    pub fn sample_from_clusters(&mut self, cluster_ids: &[usize]) -> Result<Vec<usize>, ForestError> {
        let samples_per_cluster = self.options.samples_per_cluster;
        let mut samples = Vec::with_capacity(cluster_ids.len() * samples_per_cluster);
        for cluster_id in cluster_ids {
            let members = self
                .options
                .cluster_map
                .get(cluster_id)
                .ok_or_else(|| ForestError::InvalidArgument(format!("unknown cluster id {}", cluster_id)))?
                .clone();
            let fraction = samples_per_cluster as f64 / members.len() as f64;
            if fraction > 1.0 {
                debug!(
                    "Cluster {} has {} rows, fewer than the {} requested; using all of them.",
                    cluster_id,
                    members.len(),
                    samples_per_cluster
                );
            }
            let mut drawn = self.subsample(&members, fraction)?;
            drawn.truncate(samples_per_cluster);
            samples.extend(drawn);
        }
        Ok(samples)
    }

    /// Draw `num_samples` distinct indices from `[0, max)` minus `skip`,
    /// picking the cheaper method for the requested density.
    pub fn draw(&mut self, max: usize, skip: &BTreeSet<usize>, num_samples: usize) -> Result<Vec<usize>, ForestError> {
        if num_samples < max / 2 {
            self.draw_simple(max, skip, num_samples)
        } else {
            self.draw_knuth(max, skip, num_samples)
        }
    }

    /// Rejection sampling; efficient while `num_samples` is well below `max`.
    pub fn draw_simple(
        &mut self,
        max: usize,
        skip: &BTreeSet<usize>,
        num_samples: usize,
    ) -> Result<Vec<usize>, ForestError> {
        let available = validate_draw(max, skip, num_samples)?;
        let mut selected = vec![false; max];
        let mut result = Vec::with_capacity(num_samples);
        for _ in 0..num_samples {
            loop {
                let draw = shift_past_skipped(self.rng.gen_range(0..available), skip);
                if !selected[draw] {
                    selected[draw] = true;
                    result.push(draw);
                    break;
                }
            }
        }
        Ok(result)
    }

    /// Selection sampling (Knuth's Algorithm S), a single pass over the
    /// candidates. Output is in increasing order.
    pub fn draw_knuth(
        &mut self,
        max: usize,
        skip: &BTreeSet<usize>,
        num_samples: usize,
    ) -> Result<Vec<usize>, ForestError> {
        let available = validate_draw(max, skip, num_samples)?;
        let mut result = Vec::with_capacity(num_samples);
        let mut j = 0;
        while result.len() < num_samples {
            let u: f64 = self.rng.gen();
            let remaining = (available - j) as f64;
            if remaining * u < (num_samples - result.len()) as f64 {
                result.push(shift_past_skipped(j, skip));
            }
            j += 1;
        }
        Ok(result)
    }

    /// Draw `num_samples` distinct indices from `[0, max)` with probability
    /// proportional to `weights`, rejecting repeats.
    pub fn draw_weighted(&mut self, max: usize, num_samples: usize, weights: &[f64]) -> Result<Vec<usize>, ForestError> {
        if weights.len() != max {
            return Err(ForestError::InvalidArgument(format!(
                "{} weights provided for {} candidates",
                weights.len(),
                max
            )));
        }
        let positive = weights.iter().filter(|w| **w > 0.0).count();
        if num_samples > positive {
            return Err(ForestError::InvalidArgument(format!(
                "cannot draw {} distinct indices, only {} have positive weight",
                num_samples, positive
            )));
        }
        if num_samples == 0 {
            return Ok(Vec::new());
        }
        let distribution = WeightedIndex::new(weights).map_err(|e| ForestError::InvalidArgument(e.to_string()))?;

        let mut selected = vec![false; max];
        let mut result = Vec::with_capacity(num_samples);
        for _ in 0..num_samples {
            loop {
                let draw = distribution.sample(&mut self.rng);
                if !selected[draw] {
                    selected[draw] = true;
                    result.push(draw);
                    break;
                }
            }
        }
        Ok(result)
    }

    /// Poisson distributed count with the given mean.
    pub fn sample_poisson(&mut self, mean: f64) -> Result<usize, ForestError> {
        if !mean.is_finite() || mean < 0.0 {
            return Err(ForestError::InvalidArgument(format!(
                "poisson mean must be finite and non-negative, found {}",
                mean
            )));
        }
        if mean == 0.0 {
            return Ok(0);
        }
        let distribution = Poisson::new(mean).map_err(|e| ForestError::InvalidArgument(e.to_string()))?;
        let draw: f64 = distribution.sample(&mut self.rng);
        Ok(draw as usize)
    }
}

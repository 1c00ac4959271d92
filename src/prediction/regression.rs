//! Regression forest predictions from per-leaf outcome means.
use crate::constants::{DEFAULT_CI_GROUP_SIZE, OUTCOME};
use crate::data::Observations;
use crate::debias::{BayesDebiaser, Debiaser};
use crate::errors::ForestError;
use crate::prediction::variance::{validate_ci_group_size, GroupedJackknife};
use crate::prediction::LeafValues;
use std::sync::Arc;

/// Monte Carlo debiased squared error.
///
/// `residual` is the observed outcome minus the forest prediction and
/// `deviations` holds, for every non-empty tree, that tree's leaf estimate
/// minus the forest prediction. The squared residual overstates the error by
/// the Monte Carlo variance of the forest average, estimated here by
/// `sum(deviation^2) / (T (T - 1))`. Fewer than two trees give `NaN`.
pub fn debiased_error(residual: f64, deviations: &[f64]) -> f64 {
    let num_trees = deviations.len();
    if num_trees <= 1 {
        return f64::NAN;
    }
    let bias = deviations.iter().map(|d| d * d).sum::<f64>() / (num_trees * (num_trees - 1)) as f64;
    residual * residual - bias
}

pub struct RegressionStrategy {
    ci_group_size: usize,
    debiaser: Arc<dyn Debiaser>,
}

impl Default for RegressionStrategy {
    fn default() -> Self {
        RegressionStrategy {
            ci_group_size: DEFAULT_CI_GROUP_SIZE,
            debiaser: Arc::new(BayesDebiaser),
        }
    }
}

impl RegressionStrategy {
    /// Create a regression strategy whose variance estimates group trees in
    /// blocks of `ci_group_size`, which must be at least 2.
    pub fn new(ci_group_size: usize) -> Result<Self, ForestError> {
        validate_ci_group_size(ci_group_size)?;
        Ok(RegressionStrategy {
            ci_group_size,
            debiaser: Arc::new(BayesDebiaser),
        })
    }

    pub fn with_debiaser(mut self, debiaser: Arc<dyn Debiaser>) -> Self {
        self.debiaser = debiaser;
        self
    }

    pub fn prediction_length(&self) -> usize {
        1
    }

    pub fn prediction_value_length(&self) -> usize {
        1
    }

    pub fn requires_leaf_sample_ids(&self) -> bool {
        false
    }

    /// Mean outcome of every leaf, `None` for empty leaves.
    pub fn precompute_prediction_values(&self, samples_by_leaf: &[Vec<usize>], observations: &Observations) -> LeafValues {
        samples_by_leaf
            .iter()
            .map(|samples| {
                if samples.is_empty() {
                    None
                } else {
                    let total: f64 = samples.iter().map(|s| observations.get(OUTCOME, *s)).sum();
                    Some(vec![total / samples.len() as f64])
                }
            })
            .collect()
    }

    /// The forest prediction is the average of the query's leaf means, `NaN`
    /// when the average carries no outcome.
    pub fn predict(&self, average: &[f64]) -> Vec<f64> {
        vec![average.get(OUTCOME).copied().unwrap_or(f64::NAN)]
    }

    /// Grouped jackknife variance of the averaged leaf means.
    pub fn compute_variance(&self, average: &[f64], leaf_values: &LeafValues) -> Result<f64, ForestError> {
        let center = outcome_of(average, "average")?;
        let mut invalid = None;
        let jackknife = GroupedJackknife::accumulate(self.ci_group_size, leaf_values.len(), |tree| {
            let value = leaf_values[tree].as_ref()?;
            match outcome_of(value, "leaf value") {
                Ok(v) => Some(v - center),
                Err(e) => {
                    invalid.get_or_insert(e);
                    None
                }
            }
        })?;
        if let Some(e) = invalid {
            return Err(e);
        }
        jackknife.finish(self.debiaser.as_ref())
    }

    /// Debiased squared error of the prediction for a training `sample`.
    pub fn compute_debiased_error(
        &self,
        sample: usize,
        average: &[f64],
        leaf_values: &LeafValues,
        observations: &Observations,
    ) -> f64 {
        if sample >= observations.num_samples() {
            return f64::NAN;
        }
        let Some(center) = average.get(OUTCOME).copied() else {
            return f64::NAN;
        };
        let residual = observations.get(OUTCOME, sample) - center;
        let mut deviations = Vec::with_capacity(leaf_values.len());
        for value in leaf_values.iter().flatten() {
            match value.get(OUTCOME) {
                Some(v) => deviations.push(v - center),
                None => return f64::NAN,
            }
        }
        debiased_error(residual, &deviations)
    }
}

fn outcome_of(value: &[f64], what: &str) -> Result<f64, ForestError> {
    value.get(OUTCOME).copied().ok_or_else(|| {
        ForestError::InvalidArgument(format!("{} has {} entries, expected 1", what, value.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::average_leaf_values;

    #[test]
    fn test_debiased_error_closed_form() {
        assert!(debiased_error(1.0, &[]).is_nan());
        assert!(debiased_error(1.0, &[0.5]).is_nan());
        // Two trees deviating by v: bias = 2 v^2 / 2.
        let v = 0.6;
        let e = debiased_error(1.5, &[v, v]);
        assert!((e - (2.25 - v * v)).abs() < 1e-12);
        let e = debiased_error(0.0, &[1.0, -1.0, 2.0]);
        assert!((e + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_precompute_and_predict() {
        let obs = Observations::from_outcome(vec![1.0, 2.0, 3.0, 4.0]);
        let strategy = RegressionStrategy::default();
        let leaves = vec![vec![0, 1], Vec::new(), vec![2, 3], vec![3]];
        let values = strategy.precompute_prediction_values(&leaves, &obs);
        assert_eq!(values, vec![Some(vec![1.5]), None, Some(vec![3.5]), Some(vec![4.0])]);
        let average = average_leaf_values(&values, 1).unwrap();
        assert!((average[0] - 3.0).abs() < 1e-12);
        assert_eq!(strategy.predict(&average), vec![average[0]]);
    }

    #[test]
    fn test_debiased_error_skips_empty_leaves() {
        let obs = Observations::from_outcome(vec![2.0]);
        let strategy = RegressionStrategy::default();
        let values = vec![Some(vec![1.0]), None, Some(vec![3.0])];
        let average = vec![2.0];
        // Residual 0, deviations -1 and 1: bias = 2 / 2.
        let e = strategy.compute_debiased_error(0, &average, &values, &obs);
        assert!((e + 1.0).abs() < 1e-12);
        let single = vec![Some(vec![1.0]), None];
        assert!(strategy.compute_debiased_error(0, &average, &single, &obs).is_nan());
    }

    #[test]
    fn test_variance() {
        let strategy = RegressionStrategy::new(2).unwrap();
        let constant = vec![Some(vec![1.0]); 6];
        assert!(strategy.compute_variance(&[1.0], &constant).unwrap().abs() < 1e-12);

        let values: LeafValues = (0..40).map(|i| Some(vec![(i / 2) as f64 * 0.1])).collect();
        let average = average_leaf_values(&values, 1).unwrap();
        let variance = strategy.compute_variance(&average, &values).unwrap();
        assert!(variance > 0.0);

        let empty: LeafValues = vec![None, Some(vec![1.0])];
        assert!(strategy.compute_variance(&[1.0], &empty).is_err());
    }

    #[test]
    fn test_ci_group_size_validated() {
        assert!(matches!(
            RegressionStrategy::new(1),
            Err(ForestError::InvalidArgument(_))
        ));
        assert!(RegressionStrategy::new(0).is_err());
        assert!(RegressionStrategy::new(3).is_ok());
    }

    #[test]
    fn test_malformed_leaf_values() {
        let obs = Observations::from_outcome(vec![2.0]);
        let strategy = RegressionStrategy::default();
        assert!(strategy.predict(&[])[0].is_nan());

        let short: LeafValues = vec![Some(vec![]), Some(vec![3.0])];
        assert!(matches!(
            strategy.compute_variance(&[2.0], &short),
            Err(ForestError::InvalidArgument(_))
        ));
        assert!(matches!(
            strategy.compute_variance(&[], &vec![Some(vec![1.0]); 2]),
            Err(ForestError::InvalidArgument(_))
        ));
        assert!(strategy.compute_debiased_error(0, &[2.0], &short, &obs).is_nan());
        assert!(strategy
            .compute_debiased_error(0, &[], &vec![Some(vec![1.0]); 2], &obs)
            .is_nan());
    }
}

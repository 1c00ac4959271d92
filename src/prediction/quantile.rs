//! Quantile forest predictions: weighted quantiles of the neighbours' outcomes.
use crate::constants::OUTCOME;
use crate::data::Observations;
use crate::errors::ForestError;
use crate::prediction::NeighborWeights;
use crate::utils::{validate_float_parameter, weighted_quantiles};
use log::warn;

pub struct QuantileStrategy {
    quantiles: Vec<f64>,
}

impl QuantileStrategy {
    /// * `quantiles` - Requested quantiles, each strictly between 0 and 1.
    pub fn new(quantiles: Vec<f64>) -> Result<Self, ForestError> {
        if quantiles.is_empty() {
            return Err(ForestError::InvalidParameter(
                "quantiles".to_string(),
                "at least one quantile".to_string(),
                "an empty list".to_string(),
            ));
        }
        for q in &quantiles {
            validate_float_parameter(*q, 0.0, 1.0, "quantiles")?;
            if *q == 0.0 || *q == 1.0 {
                return Err(ForestError::InvalidParameter(
                    "quantiles".to_string(),
                    "values strictly between 0 and 1".to_string(),
                    q.to_string(),
                ));
            }
        }
        Ok(QuantileStrategy { quantiles })
    }

    pub fn prediction_length(&self) -> usize {
        self.quantiles.len()
    }

    pub fn prediction_value_length(&self) -> usize {
        0
    }

    pub fn requires_leaf_sample_ids(&self) -> bool {
        true
    }

    pub fn predict(&self, weights: &NeighborWeights, observations: &Observations) -> Vec<f64> {
        let mut neighbors: Vec<(usize, f64)> = weights.iter().map(|(s, w)| (*s, *w)).collect();
        neighbors.sort_unstable_by_key(|(s, _)| *s);
        if let Some((s, w)) = neighbors
            .iter()
            .find(|(s, w)| *s >= observations.num_samples() || !w.is_finite() || *w < 0.0)
        {
            warn!("Quantile prediction skipped, neighbour {} has weight {}.", s, w);
            return vec![f64::NAN; self.quantiles.len()];
        }
        let outcomes: Vec<f64> = neighbors.iter().map(|(s, _)| observations.get(OUTCOME, *s)).collect();
        let sample_weight: Vec<f64> = neighbors.iter().map(|(_, w)| *w).collect();
        weighted_quantiles(&outcomes, &sample_weight, &self.quantiles)
    }
}

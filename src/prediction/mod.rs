//! Prediction strategies
//!
//! A forest hands every query either its neighbour weights (training samples
//! weighted by leaf co-membership) or the summaries of the leaves it fell in.
//! Each strategy turns those into point predictions, variance estimates and
//! debiased error estimates behind one uniform contract.
pub mod local_linear;
pub mod quantile;
pub mod regression;
pub mod variance;

use crate::data::Observations;
use crate::errors::ForestError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub use local_linear::{LocalLinearConfig, LocalLinearStrategy, RidgePenalty};
pub use quantile::QuantileStrategy;
pub use regression::{debiased_error, RegressionStrategy};

/// Training sample id to forest weight for one query.
pub type NeighborWeights = HashMap<usize, f64>;

/// Per-tree leaf summaries for one query, `None` where the leaf was empty.
pub type LeafValues = Vec<Option<Vec<f64>>>;

/// Average of the non-empty leaf summaries. Every summary must hold exactly
/// `value_length` entries.
pub fn average_leaf_values(leaf_values: &LeafValues, value_length: usize) -> Result<Vec<f64>, ForestError> {
    let mut average = vec![0.0; value_length];
    let mut num_leaves = 0;
    for (tree, value) in leaf_values.iter().enumerate() {
        let Some(value) = value else { continue };
        if value.len() != value_length {
            return Err(ForestError::InvalidArgument(format!(
                "leaf value of tree {} has {} entries, expected {}",
                tree,
                value.len(),
                value_length
            )));
        }
        for (a, v) in average.iter_mut().zip(value) {
            *a += v;
        }
        num_leaves += 1;
    }
    if num_leaves == 0 {
        return Err(ForestError::InsufficientData("every leaf is empty".to_string()));
    }
    for a in average.iter_mut() {
        *a /= num_leaves as f64;
    }
    Ok(average)
}

/// Everything the forest knows about one query point. Strategies read only
/// the parts they need.
#[derive(Debug, Clone, Copy)]
pub struct PredictionContext<'a> {
    /// Query row, or training row for out-of-bag and error estimates.
    pub sample: usize,
    pub neighbor_weights: Option<&'a NeighborWeights>,
    /// Training samples sharing the query's leaf, one list per tree.
    pub samples_by_tree: &'a [Vec<usize>],
    pub leaf_values: Option<&'a LeafValues>,
}

impl<'a> PredictionContext<'a> {
    pub fn from_neighbors(
        sample: usize,
        neighbor_weights: &'a NeighborWeights,
        samples_by_tree: &'a [Vec<usize>],
    ) -> Self {
        PredictionContext {
            sample,
            neighbor_weights: Some(neighbor_weights),
            samples_by_tree,
            leaf_values: None,
        }
    }

    pub fn from_leaf_values(sample: usize, leaf_values: &'a LeafValues) -> Self {
        PredictionContext {
            sample,
            neighbor_weights: None,
            samples_by_tree: &[],
            leaf_values: Some(leaf_values),
        }
    }

    fn require_neighbors(&self) -> Result<&'a NeighborWeights, ForestError> {
        self.neighbor_weights.ok_or_else(|| {
            ForestError::InvalidArgument(format!("query {} has no neighbour weights", self.sample))
        })
    }

    fn require_leaf_values(&self) -> Result<&'a LeafValues, ForestError> {
        self.leaf_values
            .ok_or_else(|| ForestError::InvalidArgument(format!("query {} has no leaf values", self.sample)))
    }
}

/// Output for one query point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predictions: Vec<f64>,
    /// `None` when variance estimates were not requested.
    pub variance_estimate: Option<f64>,
    /// `None` when error estimates were not requested.
    pub error_estimate: Option<f64>,
}

/// The closed set of prediction strategies, selected at configuration time.
pub enum PredictionStrategy<'a> {
    Regression(RegressionStrategy),
    LocalLinear(LocalLinearStrategy<'a>),
    Quantile(QuantileStrategy),
}

impl<'a> PredictionStrategy<'a> {
    /// Number of values `predict` returns.
    pub fn prediction_length(&self) -> usize {
        match self {
            PredictionStrategy::Regression(s) => s.prediction_length(),
            PredictionStrategy::LocalLinear(s) => s.prediction_length(),
            PredictionStrategy::Quantile(s) => s.prediction_length(),
        }
    }

    /// Length of each leaf summary the strategy consumes.
    pub fn prediction_value_length(&self) -> usize {
        match self {
            PredictionStrategy::Regression(s) => s.prediction_value_length(),
            PredictionStrategy::LocalLinear(s) => s.prediction_value_length(),
            PredictionStrategy::Quantile(s) => s.prediction_value_length(),
        }
    }

    /// Whether callers must provide neighbour weights and per-tree sample ids
    /// rather than leaf summaries.
    pub fn requires_leaf_sample_ids(&self) -> bool {
        match self {
            PredictionStrategy::Regression(s) => s.requires_leaf_sample_ids(),
            PredictionStrategy::LocalLinear(s) => s.requires_leaf_sample_ids(),
            PredictionStrategy::Quantile(s) => s.requires_leaf_sample_ids(),
        }
    }

    /// Point predictions; failures surface as `NaN` entries.
    pub fn predict(&self, context: &PredictionContext, observations: &Observations) -> Vec<f64> {
        match self {
            PredictionStrategy::Regression(s) => {
                match context
                    .leaf_values
                    .and_then(|v| average_leaf_values(v, s.prediction_value_length()).ok())
                {
                    Some(average) => s.predict(&average),
                    None => vec![f64::NAN],
                }
            }
            PredictionStrategy::LocalLinear(s) => match context.neighbor_weights {
                Some(weights) => s.predict(context.sample, weights, observations),
                None => vec![f64::NAN; s.prediction_length()],
            },
            PredictionStrategy::Quantile(s) => match context.neighbor_weights {
                Some(weights) => s.predict(weights, observations),
                None => vec![f64::NAN; s.prediction_length()],
            },
        }
    }

    /// Debiased variance estimate of the (first) prediction.
    pub fn compute_variance(&self, context: &PredictionContext, observations: &Observations) -> Result<f64, ForestError> {
        match self {
            PredictionStrategy::Regression(s) => {
                let leaf_values = context.require_leaf_values()?;
                let average = average_leaf_values(leaf_values, s.prediction_value_length())?;
                s.compute_variance(&average, leaf_values)
            }
            PredictionStrategy::LocalLinear(s) => {
                let weights = context.require_neighbors()?;
                s.compute_variance(context.sample, weights, context.samples_by_tree, observations)
            }
            PredictionStrategy::Quantile(_) => Ok(f64::NAN),
        }
    }

    /// Debiased squared error for a training sample.
    pub fn compute_debiased_error(&self, context: &PredictionContext, observations: &Observations) -> f64 {
        match self {
            PredictionStrategy::Regression(s) => match context.leaf_values {
                Some(leaf_values) => match average_leaf_values(leaf_values, s.prediction_value_length()) {
                    Ok(average) => s.compute_debiased_error(context.sample, &average, leaf_values, observations),
                    Err(_) => f64::NAN,
                },
                None => f64::NAN,
            },
            PredictionStrategy::LocalLinear(s) => s.compute_debiased_error(),
            PredictionStrategy::Quantile(_) => f64::NAN,
        }
    }
}

//! Forest Predictor
//!
//! Runs a prediction strategy over many query points on a dedicated rayon
//! thread pool. Numeric failures stay local to their query point and show up
//! as `NaN`; only failing to build the pool aborts the batch.
use crate::data::Observations;
use crate::errors::ForestError;
use crate::prediction::{Prediction, PredictionContext, PredictionStrategy};
use log::{debug, info};
use rayon::prelude::*;

pub struct ForestPredictor {
    num_threads: usize,
    estimate_variance: bool,
    estimate_error: bool,
}

impl Default for ForestPredictor {
    fn default() -> Self {
        ForestPredictor::new(0, false, false)
    }
}

impl ForestPredictor {
    /// * `num_threads` - Worker threads, `0` lets rayon decide.
    /// * `estimate_variance` - Also compute variance estimates.
    /// * `estimate_error` - Also compute debiased error estimates.
    pub fn new(num_threads: usize, estimate_variance: bool, estimate_error: bool) -> Self {
        ForestPredictor {
            num_threads,
            estimate_variance,
            estimate_error,
        }
    }

    pub fn predict(
        &self,
        strategy: &PredictionStrategy,
        contexts: &[PredictionContext],
        observations: &Observations,
    ) -> Result<Vec<Prediction>, ForestError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| ForestError::ThreadPool(e.to_string()))?;
        info!(
            "Predicting {} points on {} threads.",
            contexts.len(),
            pool.current_num_threads()
        );
        let predictions: Vec<Prediction> = pool.install(|| {
            contexts
                .par_iter()
                .map(|context| self.predict_point(strategy, context, observations))
                .collect()
        });
        Ok(predictions)
    }

    fn predict_point(
        &self,
        strategy: &PredictionStrategy,
        context: &PredictionContext,
        observations: &Observations,
    ) -> Prediction {
        let predictions = strategy.predict(context, observations);
        let variance_estimate = self.estimate_variance.then(|| {
            strategy.compute_variance(context, observations).unwrap_or_else(|e| {
                debug!("No variance estimate for point {}: {}", context.sample, e);
                f64::NAN
            })
        });
        let error_estimate = self
            .estimate_error
            .then(|| strategy.compute_debiased_error(context, observations));
        Prediction {
            predictions,
            variance_estimate,
            error_estimate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Matrix;
    use crate::prediction::{
        LeafValues, LocalLinearConfig, LocalLinearStrategy, NeighborWeights, RegressionStrategy,
    };

    #[test]
    fn test_local_linear_batch() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 / 9.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let queries = vec![0.1, 0.5, 0.9];
        let train = Matrix::new(&x, 10, 1).unwrap();
        let test = Matrix::new(&queries, 3, 1).unwrap();
        let obs = Observations::from_outcome(y);
        let config = LocalLinearConfig {
            lambdas: vec![0.0],
            ..LocalLinearConfig::default()
        };
        let strategy = PredictionStrategy::LocalLinear(LocalLinearStrategy::new(&train, &test, config).unwrap());

        let weights: NeighborWeights = (0..10).map(|i| (i, 0.1)).collect();
        let samples_by_tree: Vec<Vec<usize>> = (0..4).map(|t| vec![t, t + 3, t + 6]).collect();
        let contexts: Vec<PredictionContext> = (0..3)
            .map(|q| PredictionContext::from_neighbors(q, &weights, &samples_by_tree))
            .collect();

        let predictor = ForestPredictor::new(2, true, true);
        let output = predictor.predict(&strategy, &contexts, &obs).unwrap();
        assert_eq!(output.len(), 3);
        for (prediction, q) in output.iter().zip(&queries) {
            assert!((prediction.predictions[0] - 2.0 * q).abs() < 1e-9);
            let variance = prediction.variance_estimate.unwrap();
            assert!(variance.abs() < 1e-12);
            assert!(prediction.error_estimate.unwrap().is_nan());
        }
    }

    #[test]
    fn test_regression_batch_isolates_failures() {
        let obs = Observations::from_outcome(vec![1.0, 3.0]);
        let strategy = PredictionStrategy::Regression(RegressionStrategy::default());
        let good: LeafValues = vec![Some(vec![1.0]), Some(vec![3.0]), Some(vec![1.0]), Some(vec![3.0])];
        let empty: LeafValues = vec![None, None];
        let contexts = vec![
            PredictionContext::from_leaf_values(0, &good),
            PredictionContext::from_leaf_values(1, &empty),
        ];
        let output = ForestPredictor::new(1, true, true).predict(&strategy, &contexts, &obs).unwrap();
        assert_eq!(output[0].predictions, vec![2.0]);
        assert!(output[0].variance_estimate.unwrap() >= 0.0);
        // Residual -1, four deviations of 1: bias = 4 / 12.
        assert!((output[0].error_estimate.unwrap() - (1.0 - 4.0 / 12.0)).abs() < 1e-12);
        assert!(output[1].predictions[0].is_nan());
        assert!(output[1].variance_estimate.unwrap().is_nan());
        assert!(output[1].error_estimate.unwrap().is_nan());

        // Malformed leaf summaries fail only their own point.
        let ragged: LeafValues = vec![Some(vec![]), Some(vec![3.0])];
        let contexts = vec![
            PredictionContext::from_leaf_values(0, &good),
            PredictionContext::from_leaf_values(1, &ragged),
        ];
        let output = ForestPredictor::new(1, true, true).predict(&strategy, &contexts, &obs).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].predictions, vec![2.0]);
        assert!(output[1].predictions[0].is_nan());
        assert!(output[1].variance_estimate.unwrap().is_nan());
        assert!(output[1].error_estimate.unwrap().is_nan());

        let plain = ForestPredictor::default().predict(&strategy, &contexts, &obs).unwrap();
        assert!(plain[0].variance_estimate.is_none());
        assert!(plain[0].error_estimate.is_none());
    }
}

//! Local linear correction.
//!
//! Replaces the forest's weighted average with a weighted ridge regression
//! centred on the query point; the fitted intercept is the prediction. The
//! Gram matrix is built once per query and shared by every penalty.
use crate::config::ConfigIO;
use crate::constants::{DEFAULT_CI_GROUP_SIZE, DEFAULT_LAMBDA, OUTCOME};
use crate::data::{Data, Observations};
use crate::debias::{BayesDebiaser, Debiaser};
use crate::errors::ForestError;
use crate::linalg::{solve_symmetric, NormalEquations};
use crate::prediction::variance::{validate_ci_group_size, GroupedJackknife};
use crate::prediction::NeighborWeights;
use crate::utils::{fmt_vec_output, items_to_strings, validate_positive_float_parameter};
use hashbrown::HashMap;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// How the ridge penalty is scaled on the non-intercept diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RidgePenalty {
    /// `lambda * trace(M) / (p + 1)` on every non-intercept entry.
    Normalized,
    /// `lambda * M[i][i]` on entry `i`.
    PerEntry,
}

impl FromStr for RidgePenalty {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normalized" => Ok(RidgePenalty::Normalized),
            "PerEntry" => Ok(RidgePenalty::PerEntry),
            _ => Err(ForestError::ParseString(
                s.to_string(),
                "RidgePenalty".to_string(),
                items_to_strings(vec!["Normalized", "PerEntry"]),
            )),
        }
    }
}

fn default_lambdas() -> Vec<f64> {
    vec![DEFAULT_LAMBDA]
}
fn default_penalty() -> RidgePenalty {
    RidgePenalty::Normalized
}
fn default_ci_group_size() -> usize {
    DEFAULT_CI_GROUP_SIZE
}

/// Local linear prediction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalLinearConfig {
    /// Ridge penalties, one prediction per entry.
    #[serde(default = "default_lambdas")]
    pub lambdas: Vec<f64>,
    #[serde(default = "default_penalty")]
    pub penalty: RidgePenalty,
    /// Covariates used in the correction. `None` uses every column, an empty
    /// list gives a local constant fit.
    #[serde(default)]
    pub linear_correction_variables: Option<Vec<usize>>,
    /// Trees per half-sample group, used by variance estimates.
    #[serde(default = "default_ci_group_size")]
    pub ci_group_size: usize,
}

impl Default for LocalLinearConfig {
    fn default() -> Self {
        LocalLinearConfig {
            lambdas: default_lambdas(),
            penalty: default_penalty(),
            linear_correction_variables: None,
            ci_group_size: default_ci_group_size(),
        }
    }
}

impl ConfigIO for LocalLinearConfig {}

/// Design, weights and responses of one query's neighbourhood.
struct LocalSystem {
    design: DMatrix<f64>,
    weights: Vec<f64>,
    responses: DVector<f64>,
    sample_ids: Vec<usize>,
}

pub struct LocalLinearStrategy<'a> {
    train: &'a dyn Data,
    test: &'a dyn Data,
    lambdas: Vec<f64>,
    penalty: RidgePenalty,
    variables: Vec<usize>,
    ci_group_size: usize,
    debiaser: Arc<dyn Debiaser>,
}

impl<'a> LocalLinearStrategy<'a> {
    /// Create a local linear strategy.
    ///
    /// * `train` - Training covariates, rows indexed by sample id.
    /// * `test` - Query covariates, rows indexed by query id.
    /// * `config` - Penalties and correction variables.
    pub fn new(train: &'a dyn Data, test: &'a dyn Data, config: LocalLinearConfig) -> Result<Self, ForestError> {
        if config.lambdas.is_empty() {
            return Err(ForestError::InvalidParameter(
                "lambdas".to_string(),
                "at least one penalty".to_string(),
                "an empty list".to_string(),
            ));
        }
        for lambda in &config.lambdas {
            validate_positive_float_parameter(*lambda, "lambdas")?;
            if lambda.is_infinite() {
                return Err(ForestError::InvalidParameter(
                    "lambdas".to_string(),
                    "finite penalties".to_string(),
                    lambda.to_string(),
                ));
            }
        }
        validate_ci_group_size(config.ci_group_size)?;
        if train.num_cols() != test.num_cols() {
            return Err(ForestError::InvalidArgument(format!(
                "training data has {} columns but query data has {}",
                train.num_cols(),
                test.num_cols()
            )));
        }
        let variables = match config.linear_correction_variables {
            Some(v) => v,
            None => (0..train.num_cols()).collect(),
        };
        if let Some(v) = variables.iter().find(|v| **v >= train.num_cols()) {
            return Err(ForestError::InvalidArgument(format!(
                "correction variable {} is outside the {} available columns",
                v,
                train.num_cols()
            )));
        }
        debug!(
            "Local linear strategy with lambdas [{}] over {} variables.",
            fmt_vec_output(&config.lambdas),
            variables.len()
        );
        Ok(LocalLinearStrategy {
            train,
            test,
            lambdas: config.lambdas,
            penalty: config.penalty,
            variables,
            ci_group_size: config.ci_group_size,
            debiaser: Arc::new(BayesDebiaser),
        })
    }

    /// Replace the empirical-Bayes debiaser used by variance estimates.
    pub fn with_debiaser(mut self, debiaser: Arc<dyn Debiaser>) -> Self {
        self.debiaser = debiaser;
        self
    }

    pub fn lambdas(&self) -> &[f64] {
        &self.lambdas
    }

    pub fn prediction_length(&self) -> usize {
        self.lambdas.len()
    }

    /// Local linear predictions consume raw neighbours, not leaf summaries.
    pub fn prediction_value_length(&self) -> usize {
        0
    }

    pub fn requires_leaf_sample_ids(&self) -> bool {
        true
    }

    /// One local prediction per configured penalty. Singular systems and
    /// invalid neighbourhoods yield `NaN` rather than failing the batch.
    pub fn predict(&self, query: usize, weights: &NeighborWeights, observations: &Observations) -> Vec<f64> {
        match self.predict_coefficients(query, weights, observations) {
            Ok(coefficients) => coefficients
                .into_iter()
                .map(|theta| theta.map_or(f64::NAN, |t| t[0]))
                .collect(),
            Err(e) => {
                warn!("Local linear prediction for query {} failed: {}", query, e);
                vec![f64::NAN; self.lambdas.len()]
            }
        }
    }

    /// Fitted coefficients per penalty, intercept first. `None` marks a
    /// penalty whose system was singular.
    pub fn predict_coefficients(
        &self,
        query: usize,
        weights: &NeighborWeights,
        observations: &Observations,
    ) -> Result<Vec<Option<Vec<f64>>>, ForestError> {
        let system = self.local_system(query, weights, observations)?;
        let equations = NormalEquations::new(&system.design, &system.weights, &system.responses);
        let rhs = DMatrix::from_column_slice(equations.dim(), 1, equations.moment.as_slice());

        let coefficients = self
            .lambdas
            .iter()
            .map(|lambda| match self.solve_penalized(&equations, *lambda, &rhs) {
                Ok(theta) => Some(theta.column(0).iter().copied().collect()),
                Err(e) => {
                    debug!("Query {} with lambda {}: {}", query, lambda, e);
                    None
                }
            })
            .collect();
        Ok(coefficients)
    }

    /// Grouped jackknife variance of the first penalty's prediction.
    ///
    /// * `samples_by_tree` - For every tree, the training samples sharing the
    ///   query's leaf. Trees are grouped in consecutive blocks of `ci_group_size`.
    pub fn compute_variance(
        &self,
        query: usize,
        weights: &NeighborWeights,
        samples_by_tree: &[Vec<usize>],
        observations: &Observations,
    ) -> Result<f64, ForestError> {
        let lambda = self.lambdas[0];
        let system = self.local_system(query, weights, observations)?;
        let equations = NormalEquations::new(&system.design, &system.weights, &system.responses);

        let dim = equations.dim();
        let mut rhs = DMatrix::zeros(dim, 2);
        rhs.set_column(0, &equations.moment);
        rhs[(0, 1)] = 1.0;
        let solution = self.solve_penalized(&equations, lambda, &rhs)?;
        let theta = solution.column(0).clone_owned();
        let zeta = solution.column(1).clone_owned();

        let mut pseudo_residuals: HashMap<usize, f64> = HashMap::with_capacity(system.sample_ids.len());
        let fitted = &system.design * &theta;
        let sensitivity = &system.design * &zeta;
        for (row, sample) in system.sample_ids.iter().enumerate() {
            pseudo_residuals.insert(*sample, sensitivity[row] * (system.responses[row] - fitted[row]));
        }

        let mut invalid = None;
        let jackknife = GroupedJackknife::accumulate(self.ci_group_size, samples_by_tree.len(), |tree| {
            let samples = &samples_by_tree[tree];
            if samples.is_empty() {
                return None;
            }
            let mut total = 0.0;
            for sample in samples {
                let residual = match pseudo_residuals.get(sample) {
                    Some(r) => *r,
                    None => match self.pseudo_residual(query, *sample, &theta, &zeta, observations) {
                        Ok(r) => r,
                        Err(e) => {
                            invalid.get_or_insert(e);
                            return None;
                        }
                    },
                };
                total += residual;
            }
            Some(total / samples.len() as f64)
        })?;
        if let Some(e) = invalid {
            return Err(e);
        }
        debug!(
            "Query {} variance from {} good groups of {} trees.",
            query,
            jackknife.num_good_groups(),
            samples_by_tree.len()
        );
        jackknife.finish(self.debiaser.as_ref())
    }

    /// Local linear fits carry no per-tree leaf estimate to debias.
    pub fn compute_debiased_error(&self) -> f64 {
        f64::NAN
    }

    fn solve_penalized(
        &self,
        equations: &NormalEquations,
        lambda: f64,
        rhs: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, ForestError> {
        let p = equations.dim() - 1;
        if lambda == 0.0 && equations.active_rows <= p {
            return Err(ForestError::SingularSystem(format!(
                "{} weighted neighbours cannot determine {} slopes",
                equations.active_rows, p
            )));
        }
        let penalized = penalize(&equations.gram, lambda, self.penalty);
        solve_symmetric(&penalized, rhs)
    }

    fn local_system(
        &self,
        query: usize,
        weights: &NeighborWeights,
        observations: &Observations,
    ) -> Result<LocalSystem, ForestError> {
        if query >= self.test.num_rows() {
            return Err(ForestError::InvalidArgument(format!(
                "query {} is outside the {} query rows",
                query,
                self.test.num_rows()
            )));
        }
        // Sorted ids keep floating point sums independent of hash order.
        let mut neighbors: Vec<(usize, f64)> = weights.iter().map(|(s, w)| (*s, *w)).collect();
        neighbors.sort_unstable_by_key(|(s, _)| *s);

        let num_samples = self.train.num_rows().min(observations.num_samples());
        let dim = self.variables.len() + 1;
        let mut design = DMatrix::zeros(neighbors.len(), dim);
        let mut responses = DVector::zeros(neighbors.len());
        let mut row_weights = Vec::with_capacity(neighbors.len());
        let mut sample_ids = Vec::with_capacity(neighbors.len());

        for (row, (sample, weight)) in neighbors.into_iter().enumerate() {
            if sample >= num_samples {
                return Err(ForestError::InvalidArgument(format!(
                    "neighbour {} is outside the {} training samples",
                    sample, num_samples
                )));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(ForestError::InvalidArgument(format!(
                    "neighbour {} has invalid weight {}",
                    sample, weight
                )));
            }
            design[(row, 0)] = 1.0;
            for (j, var) in self.variables.iter().enumerate() {
                design[(row, j + 1)] = self.train.get(sample, *var) - self.test.get(query, *var);
            }
            responses[row] = observations.get(OUTCOME, sample);
            row_weights.push(weight);
            sample_ids.push(sample);
        }

        Ok(LocalSystem {
            design,
            weights: row_weights,
            responses,
            sample_ids,
        })
    }

    /// Pseudo residual of a sample outside the weighted neighbourhood.
    fn pseudo_residual(
        &self,
        query: usize,
        sample: usize,
        theta: &DVector<f64>,
        zeta: &DVector<f64>,
        observations: &Observations,
    ) -> Result<f64, ForestError> {
        if sample >= self.train.num_rows() || sample >= observations.num_samples() {
            return Err(ForestError::InvalidArgument(format!(
                "tree sample {} is outside the training data",
                sample
            )));
        }
        let mut fitted = theta[0];
        let mut sensitivity = zeta[0];
        for (j, var) in self.variables.iter().enumerate() {
            let x = self.train.get(sample, *var) - self.test.get(query, *var);
            fitted += x * theta[j + 1];
            sensitivity += x * zeta[j + 1];
        }
        Ok(sensitivity * (observations.get(OUTCOME, sample) - fitted))
    }
}

/// Copy of `gram` with the ridge penalty added to the non-intercept diagonal.
///
/// Both scalings grow linearly with the weights, so the fit does not depend on
/// how the neighbour weights are normalized.
pub fn penalize(gram: &DMatrix<f64>, lambda: f64, penalty: RidgePenalty) -> DMatrix<f64> {
    let mut penalized = gram.clone();
    let dim = gram.nrows();
    match penalty {
        RidgePenalty::Normalized => {
            let regularization = lambda * gram.trace() / dim as f64;
            for i in 1..dim {
                penalized[(i, i)] += regularization;
            }
        }
        RidgePenalty::PerEntry => {
            for i in 1..dim {
                penalized[(i, i)] += lambda * gram[(i, i)];
            }
        }
    }
    penalized
}

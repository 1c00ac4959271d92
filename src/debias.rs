//! Debiasing of grouped-jackknife variance estimates.
//!
//! The naive estimate `between - noise` can go negative when few groups are
//! available. [`BayesDebiaser`] instead reports the posterior mean of the true
//! variance under a flat prior restricted to non-negative values, with the
//! naive estimate treated as Gaussian.
use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};

/// Maps `(between-group variance, within-group noise, good group count)` to a
/// non-negative variance estimate.
pub trait Debiaser: Send + Sync {
    fn debias(&self, var_between: f64, group_noise: f64, num_good_groups: usize) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BayesDebiaser;

impl Debiaser for BayesDebiaser {
    fn debias(&self, var_between: f64, group_noise: f64, num_good_groups: usize) -> f64 {
        if num_good_groups == 0 || var_between.is_nan() || group_noise.is_nan() {
            return f64::NAN;
        }
        let initial_estimate = var_between - group_noise;
        let initial_se = var_between.max(group_noise) * (2.0 / num_good_groups as f64).sqrt();
        if initial_se <= 0.0 {
            return initial_estimate.max(0.0);
        }

        // Mean of N(initial_estimate, initial_se^2) truncated to [0, inf).
        let ratio = initial_estimate / initial_se;
        let numerator = (-ratio * ratio / 2.0).exp() / (2.0 * PI).sqrt();
        let denominator = 0.5 * erfc(-ratio / SQRT_2);
        if denominator <= f64::MIN_POSITIVE {
            // Far left tail: the inverse Mills ratio tends to -ratio + 1 / -ratio.
            return initial_se / -ratio;
        }
        (initial_estimate + initial_se * numerator / denominator).max(0.0)
    }
}

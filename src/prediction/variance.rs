//! Grouped jackknife over blocks of trees that share a half-sample.
use crate::debias::Debiaser;
use crate::errors::ForestError;
use log::debug;

/// Variance estimates need at least two trees per group.
pub fn validate_ci_group_size(ci_group_size: usize) -> Result<(), ForestError> {
    if ci_group_size < 2 {
        return Err(ForestError::InvalidArgument(format!(
            "variance estimates need ci_group_size of at least 2, found {}",
            ci_group_size
        )));
    }
    Ok(())
}

/// Accumulates per-tree and per-group statistics over the "good" groups, the
/// blocks of `ci_group_size` consecutive trees where every tree produced a
/// statistic.
#[derive(Debug, Clone)]
pub struct GroupedJackknife {
    ci_group_size: usize,
    num_good_groups: usize,
    tree_squared_sum: f64,
    group_squared_sum: f64,
    group_sum: f64,
}

impl GroupedJackknife {
    pub fn new(ci_group_size: usize) -> Result<Self, ForestError> {
        validate_ci_group_size(ci_group_size)?;
        Ok(GroupedJackknife {
            ci_group_size,
            num_good_groups: 0,
            tree_squared_sum: 0.0,
            group_squared_sum: 0.0,
            group_sum: 0.0,
        })
    }

    /// Walk `num_trees` trees in blocks, asking `tree_statistic` for each tree.
    /// A `None` statistic marks the whole block as unusable. Trailing trees that
    /// do not fill a block are ignored.
    pub fn accumulate<F>(ci_group_size: usize, num_trees: usize, mut tree_statistic: F) -> Result<Self, ForestError>
    where
        F: FnMut(usize) -> Option<f64>,
    {
        let mut jackknife = GroupedJackknife::new(ci_group_size)?;
        let num_groups = num_trees / ci_group_size;
        if num_trees % ci_group_size != 0 {
            debug!(
                "{} trees do not divide into groups of {}, ignoring the last {}.",
                num_trees,
                ci_group_size,
                num_trees % ci_group_size
            );
        }
        let mut statistics = Vec::with_capacity(ci_group_size);
        for group in 0..num_groups {
            statistics.clear();
            for tree in group * ci_group_size..(group + 1) * ci_group_size {
                match tree_statistic(tree) {
                    Some(s) => statistics.push(s),
                    None => break,
                }
            }
            if statistics.len() == ci_group_size {
                jackknife.add_group(&statistics);
            }
        }
        Ok(jackknife)
    }

    /// Add one good group given the statistic of each of its trees.
    pub fn add_group(&mut self, tree_statistics: &[f64]) {
        debug_assert_eq!(tree_statistics.len(), self.ci_group_size);
        let mut group_mean = 0.0;
        for s in tree_statistics {
            self.tree_squared_sum += s * s;
            group_mean += s;
        }
        group_mean /= tree_statistics.len() as f64;
        self.group_squared_sum += group_mean * group_mean;
        self.group_sum += group_mean;
        self.num_good_groups += 1;
    }

    pub fn num_good_groups(&self) -> usize {
        self.num_good_groups
    }

    /// Between-group variance and within-group noise.
    pub fn components(&self) -> Result<(f64, f64), ForestError> {
        if self.num_good_groups == 0 {
            return Err(ForestError::InsufficientData(
                "no group of trees has a statistic for every tree".to_string(),
            ));
        }
        let groups = self.num_good_groups as f64;
        let group_size = self.ci_group_size as f64;
        let mean_tree_squared = self.tree_squared_sum / groups;
        let mean_group_squared = self.group_squared_sum / groups;
        let grand_mean = self.group_sum / groups;

        let var_between = mean_group_squared - grand_mean * grand_mean;
        let var_total = mean_tree_squared / group_size - grand_mean * grand_mean;
        let group_noise = (var_total - var_between) / (group_size - 1.0);
        Ok((var_between, group_noise))
    }

    /// Debiased variance estimate.
    pub fn finish(&self, debiaser: &dyn Debiaser) -> Result<f64, ForestError> {
        let (var_between, group_noise) = self.components()?;
        Ok(debiaser.debias(var_between, group_noise, self.num_good_groups))
    }
}

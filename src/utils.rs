use crate::errors::ForestError;
use std::cmp::Ordering;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    let mut res = String::new();
    if let Some(last) = v.len().checked_sub(1) {
        if last == 0 {
            return format!("{:.4}", v[0]);
        }
        for n in &v[..last] {
            res.push_str(format!("{:.4}", n).as_str());
            res.push_str(", ");
        }
        res.push_str(format!("{:.4}", &v[last]).as_str());
    }
    res
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), ForestError> {
    validate_float_parameter(value, 0.0, f64::INFINITY, parameter)
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), ForestError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(ForestError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Weighted quantiles of `v`.
///
/// For each requested quantile the smallest value whose cumulative normalized
/// weight reaches it is returned. `quantiles` need not be sorted; the output
/// follows the input order.
///
/// * `v` - Values.
/// * `sample_weight` - Non-negative weight of each value.
/// * `quantiles` - Quantiles in `[0, 1]`.
pub fn weighted_quantiles(v: &[f64], sample_weight: &[f64], quantiles: &[f64]) -> Vec<f64> {
    let total: f64 = sample_weight.iter().sum();
    if v.is_empty() || total <= 0.0 {
        return vec![f64::NAN; quantiles.len()];
    }
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_unstable_by(|a, b| v[*a].partial_cmp(&v[*b]).unwrap_or(Ordering::Equal));

    let mut cumulative = Vec::with_capacity(idx.len());
    let mut running = 0.0;
    for i in &idx {
        running += sample_weight[*i] / total;
        cumulative.push(running);
    }

    quantiles
        .iter()
        .map(|q| {
            // First position where the cumulative weight reaches q; rounding can
            // leave the final cumulative value just under 1.
            let pos = cumulative.partition_point(|c| c < q).min(idx.len() - 1);
            v[idx[pos]]
        })
        .collect()
}

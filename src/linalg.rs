//! Linear algebra for the local ridge fits.
//!
//! ## Design notes
//!
//! * The weighted Gram matrix `XᵗWX` is built once per query and copied for
//!   every penalty.
//! * Solves scale the system to unit diagonal, then use Cholesky and fall back
//!   to column pivoted Householder QR when the factorization breaks down.
//! * A relative pivot check reports rank deficient systems instead of
//!   returning amplified round-off.
use crate::constants::PIVOT_TOLERANCE;
use crate::errors::ForestError;
use nalgebra::{DMatrix, DVector};

/// Weighted normal equations of one local fit.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    /// `XᵗWX`, symmetric, `(p + 1) x (p + 1)`.
    pub gram: DMatrix<f64>,
    /// `XᵗWY`.
    pub moment: DVector<f64>,
    /// Rows with strictly positive weight.
    pub active_rows: usize,
}

impl NormalEquations {
    /// Build the normal equations from a design matrix, row weights and responses.
    pub fn new(design: &DMatrix<f64>, weights: &[f64], responses: &DVector<f64>) -> Self {
        let mut weighted = design.clone();
        for (i, w) in weights.iter().enumerate() {
            for j in 0..weighted.ncols() {
                weighted[(i, j)] *= *w;
            }
        }
        let gram = design.transpose() * &weighted;
        let moment = weighted.transpose() * responses;
        let active_rows = weights.iter().filter(|w| **w > 0.0).count();
        NormalEquations {
            gram,
            moment,
            active_rows,
        }
    }

    /// Number of coefficients, intercept included.
    pub fn dim(&self) -> usize {
        self.gram.nrows()
    }
}

fn pivots_ok<'a>(pivots: impl Iterator<Item = &'a f64>) -> bool {
    let (min, max) = pivots.fold((f64::INFINITY, 0.0_f64), |(lo, hi), p| {
        let p = p.abs();
        (lo.min(p), hi.max(p))
    });
    max > 0.0 && min / max > PIVOT_TOLERANCE
}

/// Solve `matrix * x = rhs` for a symmetric positive semi-definite `matrix`,
/// one solution column per right hand side column.
///
/// The system is equilibrated to unit diagonal before factoring, so the rank
/// check does not depend on the units of the covariates.
pub fn solve_symmetric(matrix: &DMatrix<f64>, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>, ForestError> {
    let scale = equilibration(matrix)?;
    let scaled = DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
        scale[i] * matrix[(i, j)] * scale[j]
    });
    let scaled_rhs = DMatrix::from_fn(rhs.nrows(), rhs.ncols(), |i, j| scale[i] * rhs[(i, j)]);
    let solution = solve_equilibrated(scaled, &scaled_rhs)?;
    Ok(DMatrix::from_fn(solution.nrows(), solution.ncols(), |i, j| {
        scale[i] * solution[(i, j)]
    }))
}

/// Diagonal scaling `1 / sqrt(M[i][i])`; a zero diagonal entry means a zero column.
fn equilibration(matrix: &DMatrix<f64>) -> Result<Vec<f64>, ForestError> {
    matrix
        .diagonal()
        .iter()
        .map(|d| {
            if *d > 0.0 && d.is_finite() {
                Ok(1.0 / d.sqrt())
            } else {
                Err(ForestError::SingularSystem(
                    "normal equations have an empty column".to_string(),
                ))
            }
        })
        .collect()
}

fn solve_equilibrated(matrix: DMatrix<f64>, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>, ForestError> {
    if let Some(cholesky) = matrix.clone().cholesky() {
        let squared_pivots: Vec<f64> = cholesky.l_dirty().diagonal().iter().map(|d| d * d).collect();
        if pivots_ok(squared_pivots.iter()) {
            let solution = cholesky.solve(rhs);
            if solution.iter().all(|v| v.is_finite()) {
                return Ok(solution);
            }
        }
    }

    let qr = matrix.col_piv_qr();
    if !pivots_ok(qr.r().diagonal().iter()) {
        return Err(ForestError::SingularSystem(
            "normal equations are rank deficient".to_string(),
        ));
    }
    match qr.solve(rhs) {
        Some(solution) if solution.iter().all(|v| v.is_finite()) => Ok(solution),
        _ => Err(ForestError::SingularSystem(
            "no finite solution to the normal equations".to_string(),
        )),
    }
}

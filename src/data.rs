//! Data
//!
//! Read-only views over training covariates, query covariates and outcomes.
//! The core never mutates these; callers own the buffers.
use crate::errors::ForestError;

/// Tabular covariate source addressed by `(row, column)`.
pub trait Data: Send + Sync {
    /// Value at row `i`, column `j`.
    fn get(&self, i: usize, j: usize) -> f64;
    fn num_rows(&self) -> usize;
    fn num_cols(&self) -> usize;
}

/// Contiguous Column Major Matrix data container.
///
/// Holds a borrowed dense matrix in a single memory block, column after column
/// (Fortran-style), so whole covariate columns can be sliced without copying.
pub struct Matrix<'a> {
    /// The raw data stored in a single slice.
    pub data: &'a [f64],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a> Matrix<'a> {
    /// Create a new Matrix.
    ///
    /// * `data` - Column major values, `rows * cols` long.
    /// * `rows` - Number of rows.
    /// * `cols` - Number of columns.
    pub fn new(data: &'a [f64], rows: usize, cols: usize) -> Result<Self, ForestError> {
        if data.len() != rows * cols {
            return Err(ForestError::InvalidArgument(format!(
                "matrix of {} x {} needs {} values, {} provided",
                rows,
                cols,
                rows * cols,
                data.len()
            )));
        }
        Ok(Matrix { data, rows, cols })
    }

    fn item_index(&self, i: usize, j: usize) -> usize {
        j * self.rows + i
    }
}

impl Data for Matrix<'_> {
    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.item_index(i, j)]
    }

    fn num_rows(&self) -> usize {
        self.rows
    }

    fn num_cols(&self) -> usize {
        self.cols
    }
}

/// Per-sample outcome channels (outcome, treatment, instrument, ...).
#[derive(Debug, Clone)]
pub struct Observations {
    channels: Vec<Vec<f64>>,
    num_samples: usize,
}

impl Observations {
    /// Build observations from one vector per channel; all channels must be
    /// the same length.
    pub fn new(channels: Vec<Vec<f64>>) -> Result<Self, ForestError> {
        let num_samples = channels.first().map(|c| c.len()).unwrap_or(0);
        if let Some(bad) = channels.iter().position(|c| c.len() != num_samples) {
            return Err(ForestError::InvalidArgument(format!(
                "observation channel {} has {} samples, expected {}",
                bad,
                channels[bad].len(),
                num_samples
            )));
        }
        Ok(Observations { channels, num_samples })
    }

    /// Observations with a single outcome channel.
    pub fn from_outcome(outcome: Vec<f64>) -> Self {
        let num_samples = outcome.len();
        Observations {
            channels: vec![outcome],
            num_samples,
        }
    }

    /// Value of `channel` for `sample`.
    #[inline]
    pub fn get(&self, channel: usize, sample: usize) -> f64 {
        self.channels[channel][sample]
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OUTCOME;

    #[test]
    fn test_matrix_column_major() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = Matrix::new(&v, 3, 2).unwrap();
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(2, 0), 3.0);
        assert_eq!(m.get(0, 1), 4.0);
        assert_eq!(m.get(1, 1), 5.0);
        assert_eq!(m.num_rows(), 3);
        assert_eq!(m.num_cols(), 2);
    }

    #[test]
    fn test_matrix_shape_mismatch() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(Matrix::new(&v, 2, 2).is_err());
    }

    #[test]
    fn test_observations() {
        let obs = Observations::new(vec![vec![1.0, 2.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(obs.num_samples(), 2);
        assert_eq!(obs.num_channels(), 2);
        assert_eq!(obs.get(OUTCOME, 1), 2.0);
        assert!(Observations::new(vec![vec![1.0, 2.0], vec![0.0]]).is_err());
    }
}

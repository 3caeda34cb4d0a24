//! Dense linear algebra for the regression engine.
//!
//! The systems solved here are small (one row and column per regressor), so a
//! direct Gauss-Jordan elimination on `ndarray` is sufficient.

use ndarray::{Array1, Array2, Zip, s};
use thiserror::Error;

/// Default relative pivot tolerance for [`invert`].
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-10;

/// Errors from matrix inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InversionError {
    /// Matrix is not square
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },

    /// Elimination met a vanishing pivot
    #[error("matrix is singular at column {column}")]
    Singular {
        /// Column whose pivot fell below tolerance
        column: usize,
    },
}

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// # Arguments
/// * `matrix` - Square matrix to invert
/// * `tolerance` - Pivot threshold relative to the largest absolute entry
///
/// # Returns
/// * The inverse, or the first column whose pivot vanished
pub fn invert(matrix: &Array2<f64>, tolerance: f64) -> Result<Array2<f64>, InversionError> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(InversionError::NotSquare {
            rows: n,
            cols: matrix.ncols(),
        });
    }

    let scale = matrix.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if n > 0 && (scale == 0.0 || !scale.is_finite()) {
        return Err(InversionError::Singular { column: 0 });
    }
    let threshold = tolerance * scale;

    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let (pivot_row, pivot_abs) = (col..n)
            .map(|r| (r, a[[r, col]].abs()))
            .fold((col, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });

        if pivot_abs <= threshold {
            return Err(InversionError::Singular { column: col });
        }

        if pivot_row != col {
            swap_rows(&mut a, pivot_row, col);
            swap_rows(&mut inv, pivot_row, col);
        }

        let pivot = a[[col, col]];
        a.row_mut(col).mapv_inplace(|v| v / pivot);
        inv.row_mut(col).mapv_inplace(|v| v / pivot);

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            let a_pivot = a.row(col).to_owned();
            let inv_pivot = inv.row(col).to_owned();
            a.row_mut(row).scaled_add(-factor, &a_pivot);
            inv.row_mut(row).scaled_add(-factor, &inv_pivot);
        }
    }

    Ok(inv)
}

/// Compute Xᵀ X.
pub fn gram(x: &Array2<f64>) -> Array2<f64> {
    x.t().dot(x)
}

/// Sum of squared deviations from the mean.
pub fn total_sum_of_squares(y: &Array1<f64>) -> f64 {
    let mean = y.mean().unwrap_or(0.0);
    y.iter().map(|v| (v - mean).powi(2)).sum()
}

/// Pearson correlation of two equally long samples.
///
/// Returns `None` for fewer than two points or a constant sample.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    (denom > 0.0).then(|| cov / denom)
}

/// Swap two rows of a matrix in place
fn swap_rows(matrix: &mut Array2<f64>, i: usize, j: usize) {
    let (mut first, mut second) = matrix.multi_slice_mut((s![i, ..], s![j, ..]));
    Zip::from(&mut first)
        .and(&mut second)
        .for_each(|a, b| std::mem::swap(a, b));
}

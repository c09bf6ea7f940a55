//! Ordinary least squares for the dose→value line.
//!
//! The model is `value = intercept + slope * dose`. The design matrix is a
//! two-column `[1, dose]` per observation, so the problem is tiny, but we
//! still solve it via SVD: dose columns are frequently near-collinear with
//! the intercept (everyone runs almost the same dose for months), and SVD
//! degrades gracefully where a normal-equations solve would blow up.

use nalgebra::{DMatrix, DVector};

/// Fitted line coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
}

/// Fit `value = intercept + slope * dose` by least squares.
///
/// Returns `None` when the inputs cannot identify a line: fewer than two
/// points, fewer than two distinct doses, or an ill-conditioned system.
pub fn fit_line(doses: &[f64], values: &[f64]) -> Option<LineFit> {
    let n = doses.len();
    if n < 2 || values.len() != n {
        return None;
    }
    if doses.iter().any(|d| !d.is_finite()) || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    // A single distinct dose level cannot identify a slope.
    let first = doses[0];
    if doses.iter().all(|&d| d == first) {
        return None;
    }

    let mut x = DMatrix::<f64>::zeros(n, 2);
    let mut y = DVector::<f64>::zeros(n);
    for i in 0..n {
        x[(i, 0)] = 1.0;
        x[(i, 1)] = doses[i];
        y[i] = values[i];
    }

    let svd = x.svd(true, true);

    // Try progressively looser tolerances if the strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(&y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(LineFit {
                    intercept: beta[0],
                    slope: beta[1],
                });
            }
        }
    }

    None
}

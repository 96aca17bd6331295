//! Linear algebra utilities
//!
//! Numerical helpers for covariance manipulation and likelihood
//! computations required by the filters.

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Compute the Moore-Penrose pseudo-inverse via SVD.
///
/// Every covariance inversion in the library goes through this function so
/// that singular or near-singular matrices degrade gracefully instead of
/// failing.
///
/// # Arguments
/// * `matrix` - Matrix to invert
///
/// # Returns
/// Pseudo-inverse of the input
pub fn pseudo_inverse(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = matrix.shape();

    // `pseudo_inverse` only errors for a negative tolerance
    matrix
        .clone()
        .pseudo_inverse(f64::EPSILON * nrows.max(ncols) as f64)
        .unwrap_or_else(|_| DMatrix::zeros(ncols, nrows))
}

/// Make a matrix symmetric by averaging with its transpose.
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (matrix + matrix.transpose())
}

/// Normalize a set of log-domain values with a shifted exponential.
///
/// Computes `exp(v - max(v)) / sum(exp(v - max(v)))`, which is the
/// numerically stable form of a softmax over log values.
///
/// # Arguments
/// * `values` - Log-domain values
///
/// # Returns
/// Normalized linear-domain weights summing to 1
pub fn exp_normalize(values: &[f64]) -> Vec<f64> {
    let max_value = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut normalized: Vec<f64> = values.iter().map(|v| (v - max_value).exp()).collect();
    let sum: f64 = normalized.iter().sum();

    for value in &mut normalized {
        *value /= sum;
    }

    normalized
}

/// Compute the log-likelihood of an innovation under a zero-mean Gaussian.
///
/// `-0.5 * ln(det(2π·Σ)) - 0.5 * rᵀ·Σ⁻¹·r` where the inverse is supplied by
/// the caller (the filters cache the SVD pseudo-inverse of `Σ`).
///
/// # Arguments
/// * `residual` - Innovation vector `r`
/// * `covariance` - Innovation covariance `Σ`
/// * `covariance_inv` - Pseudo-inverse of `Σ`
pub fn gaussian_log_likelihood(
    residual: &DVector<f64>,
    covariance: &DMatrix<f64>,
    covariance_inv: &DMatrix<f64>,
) -> f64 {
    let det = (covariance * 2.0 * PI).determinant();
    let mahalanobis = (covariance_inv * residual).dot(residual);

    if det <= 0.0 {
        return -0.5 * mahalanobis;
    }

    -0.5 * det.ln() - 0.5 * mahalanobis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pseudo_inverse_identity() {
        let eye = DMatrix::<f64>::identity(4, 4);
        let inv = pseudo_inverse(&eye);

        assert!((inv - eye).norm() < 1e-12);
    }

    #[test]
    fn test_pseudo_inverse_singular() {
        // Rank-1 matrix: a plain inverse does not exist
        let mut singular = DMatrix::zeros(3, 3);
        singular[(0, 0)] = 4.0;

        let inv = pseudo_inverse(&singular);

        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
        assert!(inv[(1, 1)].abs() < 1e-12);

        // A @ A+ @ A == A for a pseudo-inverse
        let recon = &singular * &inv * &singular;
        assert!((recon - singular).norm() < 1e-9);
    }

    #[test]
    fn test_symmetrize() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        let s = symmetrize(&m);

        assert!((s[(0, 1)] - 3.0).abs() < 1e-12);
        assert!((s[(1, 0)] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_exp_normalize() {
        let weights = exp_normalize(&[0.0, 0.0]);
        assert!((weights[0] - 0.5).abs() < 1e-12);

        // Shift invariance: softmax(v) == softmax(v + c)
        let a = exp_normalize(&[-1000.0, -1001.0]);
        let b = exp_normalize(&[0.0, -1.0]);
        assert!((a[0] - b[0]).abs() < 1e-12);

        let sum: f64 = exp_normalize(&[0.3, -2.0, 5.1]).iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_log_likelihood_peak() {
        let cov = DMatrix::<f64>::identity(2, 2);
        let inv = pseudo_inverse(&cov);

        let at_mean = gaussian_log_likelihood(&DVector::zeros(2), &cov, &inv);
        let off_mean =
            gaussian_log_likelihood(&DVector::from_vec(vec![1.0, 1.0]), &cov, &inv);

        assert!(at_mean > off_mean);
        assert!((at_mean - -(2.0 * PI).ln()).abs() < 1e-9);
    }
}

//! Unscented Kalman filter.
//!
//! Sigma points are generated deterministically from the Cholesky factor
//! of the error covariance and propagated through the motion model's
//! nonlinear state transition, so no Jacobians are required. The predict
//! step also projects the predicted moments into measurement space and
//! retains the deviations needed for the cross-covariance, which keeps
//! the predicted measurement covariance available for gating before any
//! measurement arrives.

use nalgebra::{DMatrix, DVector};

use crate::common::linalg::{pseudo_inverse, symmetrize};
use crate::types::MotionModel;
use crate::{Result, TrackingError};

/// Diagonal jitter applied once when a covariance fails to factor.
const CHOLESKY_JITTER: f64 = 1e-9;

/// Sigma-point Kalman filter for a single motion model.
pub struct UnscentedKalmanFilter {
    model: MotionModel,

    state: DVector<f64>,
    error_cov: DMatrix<f64>,

    process_noise_cov: DMatrix<f64>,
    measurement_noise_cov: DMatrix<f64>,

    /// Predicted measurement mean from the last predict step
    measurement_estimate: DVector<f64>,
    /// Predicted measurement covariance `Syy`; `None` before the first predict
    measurement_cov: Option<DMatrix<f64>>,

    /// Centered transition sigma values from the last predict (DP x 2·DP+1)
    transition_deviations: DMatrix<f64>,
    /// Centered measurement sigma values from the last predict (MP x 2·DP+1)
    measurement_deviations: DMatrix<f64>,

    /// Mean weights
    wm: DVector<f64>,
    /// Covariance weights
    wc: DVector<f64>,
    /// `λ + DP`, the sigma-point spread squared
    lambda_plus_dp: f64,
}

impl UnscentedKalmanFilter {
    /// Create a filter around a motion model.
    ///
    /// `alpha` controls the sigma-point spread, `beta` encodes the assumed
    /// state distribution (2 is optimal for Gaussians) and `kappa` is the
    /// secondary scaling, conventionally `3 - DP`.
    pub fn new(
        model: MotionModel,
        state_init: DVector<f64>,
        error_cov_init: DMatrix<f64>,
        process_noise_cov: DMatrix<f64>,
        measurement_noise_cov: DMatrix<f64>,
        alpha: f64,
        beta: f64,
        kappa: f64,
    ) -> Self {
        let dp = state_init.len();
        let mp = measurement_noise_cov.nrows();
        let n_sigma = 2 * dp + 1;

        let lambda = alpha * alpha * (dp as f64 + kappa) - dp as f64;
        let lambda_plus_dp = lambda + dp as f64;

        let mut wm = DVector::from_element(n_sigma, 0.5 / lambda_plus_dp);
        let mut wc = wm.clone();
        wm[0] = lambda / lambda_plus_dp;
        wc[0] = lambda / lambda_plus_dp + 1.0 - alpha * alpha + beta;

        Self {
            model,
            state: state_init,
            error_cov: error_cov_init,
            process_noise_cov,
            measurement_noise_cov,
            measurement_estimate: DVector::zeros(mp),
            measurement_cov: None,
            transition_deviations: DMatrix::zeros(dp, n_sigma),
            measurement_deviations: DMatrix::zeros(mp, n_sigma),
            wm,
            wc,
            lambda_plus_dp,
        }
    }

    /// Generate `2n + 1` sigma points around `mean`.
    ///
    /// Columns are `mean`, `mean + coef·L_i` and `mean - coef·L_i` where `L`
    /// is the lower Cholesky factor of `cov`. A covariance that fails to
    /// factor is retried once with diagonal jitter before surfacing
    /// [`TrackingError::NotPositiveDefinite`].
    fn sigma_points(mean: &DVector<f64>, cov: &DMatrix<f64>, coef: f64) -> Result<DMatrix<f64>> {
        let n = mean.len();

        let lower = symmetrize(cov)
            .cholesky()
            .or_else(|| {
                let jittered = symmetrize(cov) + DMatrix::identity(n, n) * CHOLESKY_JITTER;
                jittered.cholesky()
            })
            .ok_or(TrackingError::NotPositiveDefinite)?
            .unpack();

        let mut points = DMatrix::zeros(n, 2 * n + 1);
        for j in 0..(2 * n + 1) {
            points.set_column(j, mean);
        }
        for i in 0..n {
            let scaled = lower.column(i) * coef;
            for r in 0..n {
                points[(r, 1 + i)] += scaled[r];
                points[(r, 1 + n + i)] -= scaled[r];
            }
        }

        Ok(points)
    }

    /// Weighted mean of sigma-function values (columns of `values`).
    fn weighted_mean(values: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
        values * weights
    }

    /// Weighted outer product of centered sigma values: `A·diag(w)·Bᵀ`.
    fn weighted_outer(
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        weights: &DVector<f64>,
    ) -> DMatrix<f64> {
        let mut scaled = a.clone();
        for (j, w) in weights.iter().enumerate() {
            scaled.column_mut(j).scale_mut(*w);
        }
        scaled * b.transpose()
    }

    /// Propagate the state estimate by `dt` seconds.
    ///
    /// On success the predicted state, error covariance, measurement
    /// estimate and measurement covariance are all updated; on a numerical
    /// fault the filter is left unchanged so the caller can drop this
    /// model's contribution for the step.
    pub fn predict(&mut self, dt: f64) -> Result<&DVector<f64>> {
        let dp = self.state.len();
        let n_sigma = 2 * dp + 1;
        let coef = self.lambda_plus_dp.sqrt();

        // Propagate sigma points through the state transition
        let sigma = Self::sigma_points(&self.state, &self.error_cov, coef)?;
        let mut transition_values = DMatrix::zeros(dp, n_sigma);
        for j in 0..n_sigma {
            let fx = self
                .model
                .state_transition(&sigma.column(j).into_owned(), dt);
            transition_values.set_column(j, &fx);
        }

        let state = Self::weighted_mean(&transition_values, &self.wm);

        let mut transition_deviations = transition_values;
        for j in 0..n_sigma {
            let mut col = transition_deviations.column_mut(j);
            col -= &state;
        }

        let error_cov = symmetrize(
            &(Self::weighted_outer(&transition_deviations, &transition_deviations, &self.wc)
                + &self.process_noise_cov),
        );

        // Regenerate sigma points from the predicted moments and project
        // them into measurement space
        let sigma = Self::sigma_points(&state, &error_cov, coef)?;
        let mp = self.measurement_noise_cov.nrows();
        let mut measurement_values = DMatrix::zeros(mp, n_sigma);
        for j in 0..n_sigma {
            let hx = self.model.measurement(&sigma.column(j).into_owned());
            measurement_values.set_column(j, &hx);
        }

        let measurement_estimate = Self::weighted_mean(&measurement_values, &self.wm);

        let mut measurement_deviations = measurement_values;
        for j in 0..n_sigma {
            let mut col = measurement_deviations.column_mut(j);
            col -= &measurement_estimate;
        }

        let measurement_cov = symmetrize(
            &(Self::weighted_outer(&measurement_deviations, &measurement_deviations, &self.wc)
                + &self.measurement_noise_cov),
        );

        // Commit only once every fallible step has succeeded
        self.state = state;
        self.error_cov = error_cov;
        self.measurement_estimate = measurement_estimate;
        self.measurement_cov = Some(measurement_cov);
        self.transition_deviations = transition_deviations;
        self.measurement_deviations = measurement_deviations;

        Ok(&self.state)
    }

    /// Fold a measurement into the state estimate.
    ///
    /// The Kalman gain uses the SVD pseudo-inverse of the predicted
    /// measurement covariance, so a singular gate degrades instead of
    /// failing.
    pub fn correct(&mut self, measurement: &DVector<f64>) -> Result<&DVector<f64>> {
        let mp = self.measurement_noise_cov.nrows();
        if measurement.len() != mp {
            return Err(TrackingError::DimensionMismatch {
                expected: mp,
                got: measurement.len(),
            });
        }

        let syy = self
            .measurement_cov
            .as_ref()
            .unwrap_or(&self.measurement_noise_cov);

        let xy_cov = Self::weighted_outer(
            &self.transition_deviations,
            &self.measurement_deviations,
            &self.wc,
        );

        let gain = &xy_cov * pseudo_inverse(syy);

        self.state += &gain * (measurement - &self.measurement_estimate);
        self.error_cov -= &gain * xy_cov.transpose();

        Ok(&self.state)
    }

    /// Inject an externally mixed state and covariance (IMM interaction).
    pub fn set_state_and_covariance(&mut self, state: DVector<f64>, error_cov: DMatrix<f64>) {
        self.state = state;
        self.error_cov = error_cov;
    }

    /// The motion model this filter propagates.
    #[inline]
    pub fn model(&self) -> MotionModel {
        self.model
    }

    /// Current state estimate.
    #[inline]
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Current state error covariance.
    #[inline]
    pub fn error_cov(&self) -> &DMatrix<f64> {
        &self.error_cov
    }

    /// Process noise covariance `Q`.
    #[inline]
    pub fn process_noise_cov(&self) -> &DMatrix<f64> {
        &self.process_noise_cov
    }

    /// Measurement noise covariance `R`.
    #[inline]
    pub fn measurement_noise_cov(&self) -> &DMatrix<f64> {
        &self.measurement_noise_cov
    }

    /// Predicted measurement covariance `Syy`, present after a predict.
    #[inline]
    pub fn measurement_cov(&self) -> Option<&DMatrix<f64>> {
        self.measurement_cov.as_ref()
    }

    /// Predicted measurement mean from the last predict step.
    #[inline]
    pub fn measurement_estimate(&self) -> &DVector<f64> {
        &self.measurement_estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MEASUREMENT_SIZE, STATE_SIZE};

    fn make_filter(model: MotionModel) -> UnscentedKalmanFilter {
        let mut state = DVector::zeros(STATE_SIZE);
        state[2] = 2.0; // vx
        state[3] = 1.0; // vy

        UnscentedKalmanFilter::new(
            model,
            state,
            DMatrix::identity(STATE_SIZE, STATE_SIZE),
            DMatrix::identity(STATE_SIZE, STATE_SIZE) * 1e-3,
            DMatrix::identity(MEASUREMENT_SIZE, MEASUREMENT_SIZE) * 1e-2,
            1.0,
            2.0,
            3.0 - STATE_SIZE as f64,
        )
    }

    #[test]
    fn test_predict_moves_along_velocity() {
        let mut ukf = make_filter(MotionModel::CV);
        ukf.predict(0.5).unwrap();

        // Linear model: the sigma-point mean matches the deterministic update
        assert!((ukf.state()[0] - 1.0).abs() < 1e-9);
        assert!((ukf.state()[1] - 0.5).abs() < 1e-9);
        assert!(ukf.measurement_cov().is_some());
    }

    #[test]
    fn test_predict_grows_uncertainty() {
        let mut ukf = make_filter(MotionModel::CV);
        let before = ukf.error_cov()[(0, 0)];
        ukf.predict(1.0).unwrap();

        // Position variance picks up the velocity variance plus Q
        assert!(ukf.error_cov()[(0, 0)] > before);
    }

    #[test]
    fn test_correct_with_predicted_measurement_is_stable() {
        let mut ukf = make_filter(MotionModel::CV);
        ukf.predict(0.1).unwrap();

        let predicted = ukf.measurement_estimate().clone();
        let before = ukf.state().clone();
        ukf.correct(&predicted).unwrap();

        // A measurement equal to the prediction leaves the state unchanged
        assert!((ukf.state() - before).norm() < 1e-9);
    }

    #[test]
    fn test_correct_pulls_toward_measurement() {
        let mut ukf = make_filter(MotionModel::CV);
        ukf.predict(0.1).unwrap();

        let mut z = ukf.measurement_estimate().clone();
        z[0] += 1.0;
        let before_x = ukf.state()[0];
        ukf.correct(&z).unwrap();

        assert!(ukf.state()[0] > before_x);
        assert!(ukf.state()[0] <= before_x + 1.0 + 1e-9);
    }

    #[test]
    fn test_correct_dimension_mismatch() {
        let mut ukf = make_filter(MotionModel::CV);
        ukf.predict(0.1).unwrap();

        let bad = DVector::zeros(3);
        assert!(matches!(
            ukf.correct(&bad),
            Err(TrackingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_set_state_and_covariance_mutates() {
        let mut ukf = make_filter(MotionModel::CV);

        let state = DVector::from_element(STATE_SIZE, 7.0);
        let cov = DMatrix::identity(STATE_SIZE, STATE_SIZE) * 3.0;
        ukf.set_state_and_covariance(state.clone(), cov.clone());

        assert_eq!(ukf.state(), &state);
        assert_eq!(ukf.error_cov(), &cov);
    }

    #[test]
    fn test_sigma_points_jitter_recovers_semidefinite() {
        // Positive semi-definite with a zero eigenvalue: strict Cholesky
        // fails, the jittered retry succeeds
        let mut cov = DMatrix::identity(STATE_SIZE, STATE_SIZE);
        cov[(0, 0)] = 0.0;
        let mean = DVector::zeros(STATE_SIZE);

        let points = UnscentedKalmanFilter::sigma_points(&mean, &cov, 1.0);
        assert!(points.is_ok());
    }

    #[test]
    fn test_sigma_points_rejects_indefinite() {
        let mut cov = DMatrix::identity(STATE_SIZE, STATE_SIZE);
        cov[(0, 0)] = -1.0;
        let mean = DVector::zeros(STATE_SIZE);

        assert!(matches!(
            UnscentedKalmanFilter::sigma_points(&mean, &cov, 1.0),
            Err(TrackingError::NotPositiveDefinite)
        ));
    }
}

//! Interacting Multiple Model estimator.
//!
//! One estimator owns a bank of unscented Kalman filters, one per motion
//! model, and blends them with the classic IMM recursion:
//!
//! 1. **Interaction** - mix the per-model states and covariances with the
//!    transition-conditioned model probabilities.
//! 2. **Prediction** - propagate each filter and combine the predicted
//!    moments, including the predicted measurement used for association.
//! 3. **Correction** - correct each filter, update the model probabilities
//!    from the measurement likelihoods, and combine the corrected moments.
//!
//! Model probabilities are kept inside `[min_probability, max_probability]`
//! by a linear rescale rather than a clamp, so no model ever collapses to
//! zero and can recover quickly when the motion changes. With
//! `min = (1 - max) / (M - 1)` the rescale maps the probability simplex
//! onto itself, so the probabilities still sum to 1.

use nalgebra::{DMatrix, DVector};
use smallvec::SmallVec;

use crate::classification;
use crate::common::angles::delta_theta;
use crate::common::linalg::{exp_normalize, gaussian_log_likelihood, pseudo_inverse};
use crate::filter::ukf::UnscentedKalmanFilter;
use crate::types::{MotionModel, TrackedObject, MEASUREMENT_SIZE, STATE_SIZE};
use crate::{Result, TrackingError};

/// Sigma-point spread parameter.
const ALPHA: f64 = 1.0;
/// Distribution shape parameter, optimal for Gaussian states.
const BETA: f64 = 2.0;

/// Probability of switching to any particular other model per step.
const MODEL_SWITCH_PROBABILITY: f64 = 0.05;
/// Upper bound for any single model probability.
const MAX_MODEL_PROBABILITY: f64 = 0.95;

/// Predict steps shorter than this keep the `corrected` flag untouched.
const MIN_PREDICT_INTERVAL: f64 = 1e-3;

/// IMM estimator for a single track.
pub struct ImmEstimator {
    filters: SmallVec<[UnscentedKalmanFilter; 4]>,
    /// Per-model state and predicted measurement from the last step
    model_states: Vec<TrackedObject>,
    /// Combined track state exposed to the manager
    current: TrackedObject,

    /// Model probabilities `μ`
    model_probability: DVector<f64>,
    /// Row-stochastic model transition matrix `Π`
    transition_probability: DMatrix<f64>,

    max_probability: f64,
    min_probability: f64,

    last_timestamp: f64,
}

impl ImmEstimator {
    /// Create an estimator initialised at `track`.
    ///
    /// `process_noise`, `measurement_noise` and `init_state_covariance`
    /// scale identity covariances of the appropriate sizes. An empty model
    /// list falls back to the default `[CTRV, CV, CA]` bank.
    pub fn new(
        track: TrackedObject,
        timestamp: f64,
        process_noise: f64,
        measurement_noise: f64,
        init_state_covariance: f64,
        motion_models: &[MotionModel],
    ) -> Self {
        let models: Vec<MotionModel> = if motion_models.is_empty() {
            vec![MotionModel::CTRV, MotionModel::CV, MotionModel::CA]
        } else {
            motion_models.to_vec()
        };
        let n_models = models.len();

        let kappa = 3.0 - STATE_SIZE as f64;
        let filters: SmallVec<[UnscentedKalmanFilter; 4]> = models
            .iter()
            .map(|&model| {
                UnscentedKalmanFilter::new(
                    model,
                    track.state_vector(),
                    DMatrix::identity(STATE_SIZE, STATE_SIZE) * init_state_covariance,
                    DMatrix::identity(STATE_SIZE, STATE_SIZE) * process_noise,
                    DMatrix::identity(MEASUREMENT_SIZE, MEASUREMENT_SIZE) * measurement_noise,
                    ALPHA,
                    BETA,
                    kappa,
                )
            })
            .collect();

        let max_probability = MAX_MODEL_PROBABILITY;
        let min_probability = (1.0 - max_probability) / (n_models as f64 - 1.0).max(1.0);

        let model_probability = DVector::from_element(n_models, 1.0 / n_models as f64);

        // Base switching mass everywhere plus the same-model remainder on
        // the diagonal keeps every row summing to 1
        let same_model = 1.0 - n_models as f64 * MODEL_SWITCH_PROBABILITY;
        let transition_probability =
            DMatrix::from_element(n_models, n_models, MODEL_SWITCH_PROBABILITY)
                + DMatrix::identity(n_models, n_models) * same_model;

        let model_states = vec![track.clone(); n_models];

        Self {
            filters,
            model_states,
            current: track,
            model_probability,
            transition_probability,
            max_probability,
            min_probability,
            last_timestamp: timestamp,
        }
    }

    /// Predict up to an absolute timestamp (seconds).
    pub fn predict_to(&mut self, timestamp: f64) -> Result<()> {
        self.predict_state(timestamp - self.last_timestamp)?;
        self.last_timestamp = timestamp;
        Ok(())
    }

    /// Predict forward by `dt` seconds.
    pub fn predict(&mut self, dt: f64) -> Result<()> {
        self.predict_state(dt)?;
        self.last_timestamp += dt;
        Ok(())
    }

    /// Predict-then-correct convenience for callers that already have the
    /// matched measurement in hand.
    pub fn track(&mut self, measurement: &TrackedObject, timestamp: f64) -> Result<()> {
        self.predict_to(timestamp)?;
        self.correct(measurement)
    }

    fn predict_state(&mut self, dt: f64) -> Result<()> {
        if self.filters.len() == 1 {
            return self.single_model_predict(dt);
        }

        let n_models = self.filters.len();

        let conditional =
            conditional_probability(&self.transition_probability, &self.model_probability);

        let states: Vec<DVector<f64>> = self
            .model_states
            .iter()
            .map(|s| s.state_vector())
            .collect();
        let covariances: Vec<DMatrix<f64>> =
            self.filters.iter().map(|f| f.error_cov().clone()).collect();

        let (mixed_states, mixed_covariances) = interaction(&states, &covariances, &conditional);

        // Propagate each model from its mixed moments. A filter that hits a
        // numerical fault is dropped from this step's combination.
        let mut predicted_states: Vec<DVector<f64>> = Vec::with_capacity(n_models);
        let mut predicted_covariances: Vec<DMatrix<f64>> = Vec::with_capacity(n_models);
        let mut valid: Vec<bool> = Vec::with_capacity(n_models);

        for j in 0..n_models {
            self.filters[j]
                .set_state_and_covariance(mixed_states[j].clone(), mixed_covariances[j].clone());

            let outcome = self.filters[j].predict(dt).map(|_| ());
            match outcome {
                Ok(()) => {
                    let predicted = self.filters[j].state().clone();
                    self.model_states[j].set_state_vector(&predicted);
                    self.model_states[j].predicted_measurement_mean =
                        self.filters[j].model().measurement(&predicted);

                    predicted_states.push(predicted);
                    predicted_covariances.push(self.filters[j].error_cov().clone());
                    valid.push(true);
                }
                Err(TrackingError::NotPositiveDefinite) => {
                    predicted_states.push(self.filters[j].state().clone());
                    predicted_covariances.push(self.filters[j].error_cov().clone());
                    valid.push(false);
                }
                Err(e) => return Err(e),
            }
        }

        if !valid.iter().any(|&v| v) {
            return Err(TrackingError::NotPositiveDefinite);
        }

        let weights = masked_weights(&self.model_probability, &valid);

        let (combined_state, combined_covariance) =
            combine_moments(&predicted_states, &predicted_covariances, &weights);

        // Save yaw before it is replaced by the predicted one
        self.current.previous_yaw = self.current.yaw;
        self.current.set_state_vector(&combined_state);
        self.current.error_covariance = combined_covariance;

        // Combined measurement moments for the association stage
        let measurements: Vec<DVector<f64>> = self
            .model_states
            .iter()
            .map(|s| s.predicted_measurement_mean.clone())
            .collect();
        let measurement_covariances: Vec<DMatrix<f64>> = self
            .filters
            .iter()
            .map(|f| {
                f.measurement_cov()
                    .unwrap_or(f.measurement_noise_cov())
                    .clone()
            })
            .collect();

        let (combined_measurement, combined_measurement_cov) =
            combine_moments(&measurements, &measurement_covariances, &weights);

        self.current.predicted_measurement_cov_inv = pseudo_inverse(&combined_measurement_cov);
        self.current.predicted_measurement_mean = combined_measurement;
        self.current.predicted_measurement_cov = combined_measurement_cov;

        if dt >= MIN_PREDICT_INTERVAL {
            self.current.corrected = false;
        }

        Ok(())
    }

    fn single_model_predict(&mut self, dt: f64) -> Result<()> {
        self.filters[0].predict(dt)?;
        let predicted = self.filters[0].state().clone();

        self.current.previous_yaw = self.current.yaw;
        self.current.set_state_vector(&predicted);
        self.current.error_covariance = self.filters[0].error_cov().clone();

        self.current.predicted_measurement_mean =
            self.filters[0].model().measurement(&predicted);
        self.current.predicted_measurement_cov = self.filters[0]
            .measurement_cov()
            .unwrap_or(self.filters[0].measurement_noise_cov())
            .clone();
        self.current.predicted_measurement_cov_inv =
            pseudo_inverse(&self.current.predicted_measurement_cov);

        self.model_states[0].set_state_vector(&predicted);
        self.model_states[0].predicted_measurement_mean =
            self.current.predicted_measurement_mean.clone();

        if dt >= MIN_PREDICT_INTERVAL {
            self.current.corrected = false;
        }

        Ok(())
    }

    /// Fold a matched measurement into the track estimate.
    ///
    /// The measurement yaw is first rewritten to the wrap- and
    /// flip-equivalent angle closest to the pre-predict yaw, absorbing
    /// detectors that cannot tell the front of an object from its back.
    pub fn correct(&mut self, measurement: &TrackedObject) -> Result<()> {
        let mut z = measurement.measurement_vector();
        z[6] = self.current.previous_yaw - delta_theta(measurement.yaw, self.current.previous_yaw);

        if self.filters.len() == 1 {
            return self.single_model_correct(measurement, &z);
        }

        let n_models = self.filters.len();
        let mut states: Vec<DVector<f64>> = Vec::with_capacity(n_models);
        let mut covariances: Vec<DMatrix<f64>> = Vec::with_capacity(n_models);
        let mut predicted_measurements: Vec<DVector<f64>> = Vec::with_capacity(n_models);
        let mut measurement_covariances: Vec<DMatrix<f64>> = Vec::with_capacity(n_models);

        for j in 0..n_models {
            self.filters[j].correct(&z)?;
            let corrected = self.filters[j].state().clone();
            self.model_states[j].set_state_vector(&corrected);

            states.push(corrected);
            covariances.push(self.filters[j].error_cov().clone());
            predicted_measurements.push(self.model_states[j].predicted_measurement_mean.clone());
            measurement_covariances.push(
                self.filters[j]
                    .measurement_cov()
                    .unwrap_or(self.filters[j].measurement_noise_cov())
                    .clone(),
            );
        }

        update_model_probability(
            &z,
            &predicted_measurements,
            &measurement_covariances,
            &mut self.model_probability,
            self.max_probability,
            self.min_probability,
        );

        let (combined_state, combined_covariance) =
            combine_moments(&states, &covariances, &self.model_probability);

        self.current.error_covariance = combined_covariance;
        self.current.set_state_vector(&combined_state);

        self.current.classification =
            classification::combine(&self.current.classification, &measurement.classification)?;
        self.current.attributes = measurement.attributes.clone();
        self.current.corrected = true;

        Ok(())
    }

    fn single_model_correct(
        &mut self,
        measurement: &TrackedObject,
        z: &DVector<f64>,
    ) -> Result<()> {
        self.filters[0].correct(z)?;

        self.current.error_covariance = self.filters[0].error_cov().clone();
        let corrected = self.filters[0].state().clone();
        self.current.set_state_vector(&corrected);
        self.model_states[0].set_state_vector(&corrected);

        self.current.classification =
            classification::combine(&self.current.classification, &measurement.classification)?;
        self.current.attributes = measurement.attributes.clone();
        self.current.corrected = true;

        Ok(())
    }

    /// Combined track state.
    #[inline]
    pub fn current_state(&self) -> &TrackedObject {
        &self.current
    }

    /// Per-model states from the last predict or correct step.
    pub fn current_states(&self) -> &[TrackedObject] {
        &self.model_states
    }

    /// Number of models in the bank.
    #[inline]
    pub fn model_count(&self) -> usize {
        self.filters.len()
    }

    /// Model probabilities `μ`.
    #[inline]
    pub fn model_probability(&self) -> &DVector<f64> {
        &self.model_probability
    }

    /// Model transition matrix `Π`.
    #[inline]
    pub fn transition_probability(&self) -> &DMatrix<f64> {
        &self.transition_probability
    }

    /// Transition-conditioned mixing probabilities for the current `μ`.
    pub fn conditional_probability(&self) -> DMatrix<f64> {
        conditional_probability(&self.transition_probability, &self.model_probability)
    }

    /// Error covariance of model `j`.
    pub fn error_covariance(&self, j: usize) -> &DMatrix<f64> {
        self.filters[j].error_cov()
    }

    /// Predicted measurement covariance of model `j` (noise covariance
    /// before the first predict).
    pub fn measurement_covariance(&self, j: usize) -> &DMatrix<f64> {
        self.filters[j]
            .measurement_cov()
            .unwrap_or(self.filters[j].measurement_noise_cov())
    }

    /// Timestamp of the last predict.
    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.last_timestamp
    }

    /// Override the estimator's notion of time.
    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.last_timestamp = timestamp;
    }
}

/// Mixing probabilities `c[i, j] = Π[i, j]·μ[i] / Σ_i Π[i, j]·μ[i]`.
fn conditional_probability(
    transition_probability: &DMatrix<f64>,
    model_probability: &DVector<f64>,
) -> DMatrix<f64> {
    let n_models = model_probability.len();
    let mut conditional = DMatrix::zeros(n_models, n_models);

    for j in 0..n_models {
        let mut sum_probability = 0.0;
        for i in 0..n_models {
            sum_probability += transition_probability[(i, j)] * model_probability[i];
        }

        for i in 0..n_models {
            conditional[(i, j)] =
                transition_probability[(i, j)] * model_probability[i] / sum_probability;
        }
    }

    conditional
}

/// IMM interaction: per-target-model mixed states and covariances.
///
/// For each target model `j`: `x̂_j = Σ_i c[i,j]·x_i` and
/// `P̂_j = Σ_i c[i,j]·(P_i + (x_i − x̂_j)(x_i − x̂_j)ᵀ)`.
fn interaction(
    states: &[DVector<f64>],
    covariances: &[DMatrix<f64>],
    conditional: &DMatrix<f64>,
) -> (Vec<DVector<f64>>, Vec<DMatrix<f64>>) {
    let n_models = states.len();
    let state_size = states[0].len();

    let mut state_estimates = vec![DVector::zeros(state_size); n_models];
    let mut covariance_estimates = vec![DMatrix::zeros(state_size, state_size); n_models];

    for j in 0..n_models {
        for i in 0..n_models {
            state_estimates[j] += &states[i] * conditional[(i, j)];
        }
    }

    for j in 0..n_models {
        for i in 0..n_models {
            let deviation = &states[i] - &state_estimates[j];
            covariance_estimates[j] +=
                (&covariances[i] + &deviation * deviation.transpose()) * conditional[(i, j)];
        }
    }

    (state_estimates, covariance_estimates)
}

/// Combine per-model moments into a single mean and covariance using the
/// model probabilities as weights.
fn combine_moments(
    states: &[DVector<f64>],
    covariances: &[DMatrix<f64>],
    weights: &DVector<f64>,
) -> (DVector<f64>, DMatrix<f64>) {
    let size = states[0].len();

    let mut combined_state = DVector::zeros(size);
    for (state, weight) in states.iter().zip(weights.iter()) {
        combined_state += state * *weight;
    }

    let mut combined_covariance = DMatrix::zeros(size, size);
    for ((state, covariance), weight) in states.iter().zip(covariances).zip(weights.iter()) {
        let deviation = state - &combined_state;
        combined_covariance += (covariance + &deviation * deviation.transpose()) * *weight;
    }

    (combined_state, combined_covariance)
}

/// Zero out the weights of invalid models and renormalize.
fn masked_weights(model_probability: &DVector<f64>, valid: &[bool]) -> DVector<f64> {
    let mut weights = model_probability.clone();
    for (w, &ok) in weights.iter_mut().zip(valid) {
        if !ok {
            *w = 0.0;
        }
    }

    let sum = weights.sum();
    if sum > 0.0 {
        weights /= sum;
    }
    weights
}

/// Update the model probabilities from the measurement likelihoods.
///
/// Per-model Gaussian log-likelihoods are normalised with a shifted
/// exponential, multiplied into the prior probabilities, renormalised, and
/// finally rescaled linearly into `[min, max]` so no model collapses.
fn update_model_probability(
    measurement: &DVector<f64>,
    predicted_measurements: &[DVector<f64>],
    measurement_covariances: &[DMatrix<f64>],
    model_probability: &mut DVector<f64>,
    max_probability: f64,
    min_probability: f64,
) {
    let n_models = model_probability.len();

    let log_likelihoods: Vec<f64> = (0..n_models)
        .map(|j| {
            let residual = measurement - &predicted_measurements[j];
            let inverse = pseudo_inverse(&measurement_covariances[j]);
            gaussian_log_likelihood(&residual, &measurement_covariances[j], &inverse)
        })
        .collect();

    let lambda = exp_normalize(&log_likelihoods);

    let lambda_sum: f64 = lambda
        .iter()
        .zip(model_probability.iter())
        .map(|(l, p)| l * p)
        .sum();

    for j in 0..n_models {
        let probability = model_probability[j] * lambda[j] / lambda_sum;
        model_probability[j] =
            probability * (max_probability - min_probability) + min_probability;
    }
}

//! Core data structures for tracking
//!
//! This module defines the track/detection exchange type, the motion model
//! and distance metric enumerations, and the tracker configuration.

use std::collections::HashMap;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::classification::Classification;

/// Track identifier
pub type TrackId = i32;

/// Sentinel id for detections that have not been assigned to a track
pub const INVALID_TRACK_ID: TrackId = -1;

/// State vector dimension: `[x, y, vx, vy, ax, ay, z, length, width, height, yaw, yaw_rate]`
pub const STATE_SIZE: usize = 12;

/// Measurement vector dimension: `[x, y, z, length, width, height, yaw]`
pub const MEASUREMENT_SIZE: usize = 7;

/// Motion model variants for the IMM bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionModel {
    /// Constant velocity
    CV,
    /// Constant acceleration
    CA,
    /// Constant position
    CP,
    /// Constant turn-rate and velocity
    CTRV,
}

/// Distance metric used to build the association cost matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceType {
    /// Planar Euclidean distance between centers
    Euclidean,
    /// Euclidean scaled by classification disagreement
    MultiClassEuclidean,
    /// Innovation-whitened distance under the predicted measurement covariance
    Mahalanobis,
    /// Mean of the multi-class Euclidean and Mahalanobis distances
    MCEMahalanobis,
}

/// A tracked object state or a single-frame detection.
///
/// Detections and tracks share this schema: a detection fills the pose,
/// size and classification fields and leaves the id at
/// [`INVALID_TRACK_ID`]; a track additionally carries the predicted
/// measurement moments and the state error covariance maintained by its
/// estimator.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: TrackId,

    // Position
    pub x: f64,
    pub y: f64,
    pub z: f64,

    // Linear velocity
    pub vx: f64,
    pub vy: f64,

    // Linear acceleration
    pub ax: f64,
    pub ay: f64,

    // Orientation
    pub yaw: f64,
    /// Yaw before the last predict step, kept for the π-ambiguity rewrite
    pub previous_yaw: f64,

    /// Turn rate
    pub yaw_rate: f64,

    // Size
    /// Extent along x
    pub length: f64,
    /// Extent along y
    pub width: f64,
    /// Extent along z
    pub height: f64,

    /// True when the last predict has been followed by a correct with a
    /// real measurement
    pub corrected: bool,

    /// Predicted measurement mean from the last predict step
    pub predicted_measurement_mean: DVector<f64>,
    /// Predicted measurement covariance from the last predict step
    pub predicted_measurement_cov: DMatrix<f64>,
    /// Cached pseudo-inverse of the predicted measurement covariance
    pub predicted_measurement_cov_inv: DMatrix<f64>,
    /// Full state error covariance
    pub error_covariance: DMatrix<f64>,

    /// Class-probability vector; the mass missing from 1 is "unknown"
    pub classification: Classification,

    /// Free-form attributes propagated from the latest matched detection
    pub attributes: HashMap<String, String>,
}

impl Default for TrackedObject {
    fn default() -> Self {
        Self {
            id: INVALID_TRACK_ID,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            vx: 0.0,
            vy: 0.0,
            ax: 0.0,
            ay: 0.0,
            yaw: 0.0,
            previous_yaw: 0.0,
            yaw_rate: 0.0,
            length: 0.0,
            width: 0.0,
            height: 0.0,
            corrected: false,
            predicted_measurement_mean: DVector::zeros(MEASUREMENT_SIZE),
            predicted_measurement_cov: DMatrix::identity(MEASUREMENT_SIZE, MEASUREMENT_SIZE)
                * 1e-4,
            predicted_measurement_cov_inv: DMatrix::identity(MEASUREMENT_SIZE, MEASUREMENT_SIZE)
                * 1e4,
            error_covariance: DMatrix::identity(STATE_SIZE, STATE_SIZE) * 1e-4,
            classification: Classification::from_element(1, 1.0),
            attributes: HashMap::new(),
        }
    }
}

impl TrackedObject {
    /// An object is dynamic when its planar speed exceeds 1 m/s.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        (self.vx * self.vx + self.vy * self.vy) > 1.0
    }

    /// Pack the kinematic fields into a state vector.
    pub fn state_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![
            self.x,
            self.y,
            self.vx,
            self.vy,
            self.ax,
            self.ay,
            self.z,
            self.length,
            self.width,
            self.height,
            self.yaw,
            self.yaw_rate,
        ])
    }

    /// Unpack a state vector into the kinematic fields.
    pub fn set_state_vector(&mut self, vector: &DVector<f64>) {
        self.x = vector[0];
        self.y = vector[1];
        self.vx = vector[2];
        self.vy = vector[3];
        self.ax = vector[4];
        self.ay = vector[5];
        self.z = vector[6];
        self.length = vector[7];
        self.width = vector[8];
        self.height = vector[9];
        self.yaw = vector[10];
        self.yaw_rate = vector[11];
    }

    /// Pack the observable fields into a measurement vector.
    pub fn measurement_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![
            self.x,
            self.y,
            self.z,
            self.length,
            self.width,
            self.height,
            self.yaw,
        ])
    }
}

impl fmt::Display for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrackedObject(id: {}, x: {:.3}, y: {:.3}, vx: {:.3}, vy: {:.3}, ax: {:.3}, ay: {:.3}, \
             z: {:.3}, l: {:.3}, w: {:.3}, h: {:.3}, yaw: {:.3}, yaw_rate: {:.3})",
            self.id,
            self.x,
            self.y,
            self.vx,
            self.vy,
            self.ax,
            self.ay,
            self.z,
            self.length,
            self.width,
            self.height,
            self.yaw,
            self.yaw_rate,
        )
    }
}

/// Tracker configuration.
///
/// Frame-count thresholds can be rederived from the time-domain thresholds
/// for a given frame rate with
/// [`TrackManager::update_tracker_config`](crate::manager::TrackManager::update_tracker_config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Misses tolerated for reliable dynamic tracks before deletion
    pub non_measurement_frames_dynamic: u32,
    /// Misses tolerated for reliable static tracks before suspension
    pub non_measurement_frames_static: u32,
    /// Corrections required to promote a track to reliable
    pub max_unreliable_frames: u32,
    /// Corrections required to re-promote a reactivated track
    pub reactivation_frames: u32,

    /// Time-domain equivalent of `non_measurement_frames_dynamic` (seconds)
    pub non_measurement_time_dynamic: f64,
    /// Time-domain equivalent of `non_measurement_frames_static` (seconds)
    pub non_measurement_time_static: f64,
    /// Time-domain equivalent of `max_unreliable_frames` (seconds)
    pub max_unreliable_time: f64,

    /// Scale applied to the process noise identity
    pub default_process_noise: f64,
    /// Scale applied to the measurement noise identity
    pub default_measurement_noise: f64,
    /// Scale applied to the initial error covariance identity
    pub init_state_covariance: f64,

    /// Model bank; ordering does not affect semantics
    pub motion_models: Vec<MotionModel>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            non_measurement_frames_dynamic: 15,
            non_measurement_frames_static: 30,
            max_unreliable_frames: 2,
            reactivation_frames: 1,
            non_measurement_time_dynamic: 0.2666,
            non_measurement_time_static: 0.5333,
            max_unreliable_time: 0.3333,
            default_process_noise: 1e-3,
            default_measurement_noise: 1e-2,
            init_state_covariance: 1.0,
            motion_models: vec![MotionModel::CV, MotionModel::CA, MotionModel::CTRV],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_vector_round_trip() {
        let mut object = TrackedObject::default();
        object.x = 1.0;
        object.y = 2.0;
        object.vx = 3.0;
        object.vy = 4.0;
        object.ax = 5.0;
        object.ay = 6.0;
        object.z = 7.0;
        object.length = 8.0;
        object.width = 9.0;
        object.height = 10.0;
        object.yaw = 11.0;
        object.yaw_rate = 12.0;

        let state = object.state_vector();
        assert_eq!(state.len(), STATE_SIZE);

        let mut other = TrackedObject::default();
        other.set_state_vector(&state);
        assert_eq!(other.state_vector(), state);
    }

    #[test]
    fn test_measurement_vector_layout() {
        let mut object = TrackedObject::default();
        object.x = 1.0;
        object.y = 2.0;
        object.z = 3.0;
        object.length = 4.0;
        object.width = 5.0;
        object.height = 6.0;
        object.yaw = 0.5;

        let z = object.measurement_vector();
        assert_eq!(z.len(), MEASUREMENT_SIZE);
        assert_eq!(z[2], 3.0);
        assert_eq!(z[6], 0.5);
    }

    #[test]
    fn test_is_dynamic_threshold() {
        let mut object = TrackedObject::default();
        assert!(!object.is_dynamic());

        // Exactly 1 m²/s² is still static
        object.vx = 1.0;
        assert!(!object.is_dynamic());

        object.vy = 0.5;
        assert!(object.is_dynamic());
    }

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_unreliable_frames, 2);
        assert_eq!(config.motion_models.len(), 3);
    }
}

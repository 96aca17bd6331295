//! Motion model dynamics.
//!
//! Each model is a pure mapping of the 12-dimensional state forward in
//! time plus the common projection onto the 7-dimensional measurement
//! space. Process and measurement noise are additive and owned by the
//! filter covariances, so the functions here are noise-free.
//!
//! State layout: `[x, y, vx, vy, ax, ay, z, length, width, height, yaw, yaw_rate]`.
//! Measurement layout: `[x, y, z, length, width, height, yaw]`.

use nalgebra::DVector;

use crate::types::{MotionModel, MEASUREMENT_SIZE};

/// Turn rates below this magnitude degrade CTRV to constant velocity.
const YAW_RATE_EPSILON: f64 = 1e-5;

impl MotionModel {
    /// Propagate a state vector by `dt` seconds.
    ///
    /// Dimensions a model does not describe are passed through unchanged;
    /// dynamic components a model excludes are zeroed.
    pub fn state_transition(&self, x_k: &DVector<f64>, dt: f64) -> DVector<f64> {
        let mut x = x_k.clone();

        match self {
            MotionModel::CV => {
                x[0] = x_k[0] + x_k[2] * dt;
                x[1] = x_k[1] + x_k[3] * dt;
                x[4] = 0.0;
                x[5] = 0.0;
                x[11] = 0.0;
            }
            MotionModel::CA => {
                x[0] = x_k[0] + x_k[2] * dt + 0.5 * x_k[4] * dt * dt;
                x[1] = x_k[1] + x_k[3] * dt + 0.5 * x_k[5] * dt * dt;
                x[2] = x_k[2] + x_k[4] * dt;
                x[3] = x_k[3] + x_k[5] * dt;
                x[11] = 0.0;
            }
            MotionModel::CP => {
                x[2] = 0.0;
                x[3] = 0.0;
                x[4] = 0.0;
                x[5] = 0.0;
                x[11] = 0.0;
            }
            MotionModel::CTRV => {
                let yaw_rate = x_k[11];
                let speed = x_k[2].hypot(x_k[3]);
                let heading = x_k[3].atan2(x_k[2]);

                if yaw_rate.abs() > YAW_RATE_EPSILON {
                    // Closed-form arc: speed is preserved, the velocity
                    // heading rotates by yaw_rate * dt
                    let turned = heading + yaw_rate * dt;
                    x[0] = x_k[0] + speed / yaw_rate * (turned.sin() - heading.sin());
                    x[1] = x_k[1] + speed / yaw_rate * (heading.cos() - turned.cos());
                    x[2] = speed * turned.cos();
                    x[3] = speed * turned.sin();
                } else {
                    x[0] = x_k[0] + x_k[2] * dt;
                    x[1] = x_k[1] + x_k[3] * dt;
                }

                x[4] = 0.0;
                x[5] = 0.0;
                x[10] = x_k[10] + yaw_rate * dt;
            }
        }

        x
    }

    /// Project a state onto the measurement space.
    ///
    /// The projection `[x, y, z, length, width, height, yaw]` is shared by
    /// all models.
    pub fn measurement(&self, x_k: &DVector<f64>) -> DVector<f64> {
        let mut z = DVector::zeros(MEASUREMENT_SIZE);
        z[0] = x_k[0];
        z[1] = x_k[1];
        z[2] = x_k[6];
        z[3] = x_k[7];
        z[4] = x_k[8];
        z[5] = x_k[9];
        z[6] = x_k[10];
        z
    }
}

//! Angle arithmetic for yaw handling.
//!
//! Detections from 2D detectors cannot distinguish the front and back of a
//! symmetric object, so yaw arrives with a possible π ambiguity on top of
//! the usual 2π wrap. [`delta_theta`] absorbs both.

use std::f64::consts::PI;

/// Difference between two angles, wrapped to `(-π, π]`.
///
/// Insensitive to any multiple of 2π on either input.
pub fn angle_difference(theta1: f64, theta2: f64) -> f64 {
    let (ay, ax) = theta1.sin_cos();
    let (by, bx) = theta2.sin_cos();

    let cx = ax * bx + ay * by;
    let cy = ax * by - ay * bx;

    cy.atan2(cx)
}

/// Difference between two angles allowing a π jump.
///
/// Treats `theta1` and `theta1 + π` as equivalent: the smaller of the two
/// wrapped differences is returned, so `delta_theta(a, a + π) == 0`.
pub fn delta_theta(theta1: f64, theta2: f64) -> f64 {
    let angle_a = angle_difference(theta1, theta2);
    let angle_b = angle_difference(theta1 + PI, theta2);

    if angle_a.abs() < angle_b.abs() {
        angle_a
    } else {
        angle_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_difference_wraps() {
        assert!((angle_difference(0.0, 0.5) - 0.5).abs() < 1e-12);
        assert!((angle_difference(0.5, 0.0) + 0.5).abs() < 1e-12);

        // Wrap across the ±π boundary
        let d = angle_difference(PI - 0.1, -PI + 0.1);
        assert!((d - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_angle_difference_period() {
        let a = 1.3;
        let b = -0.4;
        let d = angle_difference(a, b);

        assert!((angle_difference(a + 2.0 * PI, b) - d).abs() < 1e-12);
        assert!((angle_difference(a, b - 4.0 * PI) - d).abs() < 1e-12);
    }

    #[test]
    fn test_delta_theta_period() {
        let d = delta_theta(0.7, -0.2);
        assert!((delta_theta(0.7 + 2.0 * PI, -0.2) - d).abs() < 1e-12);
    }

    #[test]
    fn test_delta_theta_pi_jump() {
        assert!(delta_theta(0.3, 0.3 + PI).abs() < 1e-12);
        assert!(delta_theta(0.3 + PI, 0.3).abs() < 1e-12);

        // A small offset near the flipped orientation resolves to the offset
        let d = delta_theta(0.05 + PI, 0.0);
        assert!((d - 0.05).abs() < 1e-12);
    }
}

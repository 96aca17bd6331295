//! Common utilities shared by the filters and the association stage.
//!
//! This module contains the numerical helpers (SVD pseudo-inverse,
//! normalisation in log space) and the angle arithmetic used by the
//! yaw-ambiguity handling.

pub mod angles;
pub mod linalg;

pub use angles::{angle_difference, delta_theta};
pub use linalg::{exp_normalize, gaussian_log_likelihood, pseudo_inverse, symmetrize};

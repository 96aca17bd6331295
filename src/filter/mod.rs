//! State estimation
//!
//! This module provides the per-model unscented Kalman filter and the
//! IMM (Interacting Multiple Model) estimator that mixes a bank of them
//! into a single track estimate:
//!
//! - [`ukf`] - Sigma-point Kalman filter for one motion model
//! - [`imm`] - Model bank with probability mixing

pub mod imm;
pub mod ukf;

pub use imm::ImmEstimator;
pub use ukf::UnscentedKalmanFilter;

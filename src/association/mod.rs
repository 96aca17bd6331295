//! Data association
//!
//! This module turns a set of tracks and a set of detections into an
//! assignment:
//!
//! - [`distance`] - Pairwise cost functions between a detection and a track
//! - [`hungarian`] - Munkres solver for a square cost matrix
//! - [`matcher`] - Gated bipartite matcher with connected-component
//!   decomposition

pub mod distance;
pub mod hungarian;
pub mod matcher;

pub use distance::{
    compound_distance, euclidean_distance, mahalanobis_distance, multiclass_scaled_distance,
    object_distance,
};
pub use matcher::{match_objects, GatedHungarianMatcher, MatchResult, MatcherOptions, OptimizeFlag};

/*!
# Boxtrack - Multi-object tracking library

Multi-object tracker for perception pipelines that turns a stream of noisy
per-frame 3D box detections into a stable set of identified, smoothed
tracks with predicted motion between frames.

## Features

- Per-track IMM (Interacting Multiple Model) estimator over a bank of
  unscented Kalman filters
- Four motion models: constant velocity, constant acceleration,
  constant position, constant turn-rate and velocity
- Track lifecycle management (unreliable / reliable / suspended)
- Gated Hungarian data association with pluggable distance metrics

## Modules

- [`tracker`] - Tracking façades (`MultipleObjectTracker`, `IdTracker`)
- [`manager`] - Track ownership and lifecycle state machine
- [`filter`] - Unscented Kalman filter and IMM estimator
- [`models`] - Motion model state transition and measurement functions
- [`association`] - Distance metrics and the gated bipartite matcher
- [`classification`] - Class-probability table and algebra
- [`common`] - Low-level utilities (linear algebra, angles)

## Example

```rust,no_run
use boxtrack::{MultipleObjectTracker, TrackerConfig, TrackedObject, DistanceType};
use boxtrack::classification::ClassificationData;

let classes = ClassificationData::new(vec!["Car".into(), "Bike".into()]).unwrap();

let mut detection = TrackedObject::default();
detection.x = 1.0;
detection.y = 2.0;
detection.length = 4.2;
detection.width = 1.8;
detection.classification = classes.classification("Car", 0.9).unwrap();

let config = TrackerConfig::default();
let mut tracker = MultipleObjectTracker::new(config, DistanceType::MultiClassEuclidean, 5.0);
tracker.track(vec![detection], 0.0, 0.5).unwrap();

for track in tracker.reliable_tracks() {
    println!("{track}");
}
```
*/

pub mod common;

pub mod types;

pub mod classification;

/// Motion model state transition and measurement projections
pub mod models;

/// Unscented Kalman filter and the IMM estimator built on top of it
pub mod filter;

/// Distance metrics, Hungarian solver and the gated bipartite matcher
pub mod association;

/// Track ownership, counters and the lifecycle state machine
pub mod manager;

/// Frame-level tracking façades
pub mod tracker;

// Core types
pub use types::{DistanceType, MotionModel, TrackId, TrackedObject, TrackerConfig, INVALID_TRACK_ID};

pub use classification::{Classification, ClassificationData};
pub use filter::{ImmEstimator, UnscentedKalmanFilter};
pub use manager::TrackManager;
pub use tracker::{IdTracker, MultipleObjectTracker};

// Error types
pub use crate::error::{Result, TrackingError};

mod error {
    use thiserror::Error;

    use crate::types::TrackId;

    /// Errors surfaced by the tracking library
    #[derive(Error, Debug)]
    pub enum TrackingError {
        #[error("dimension mismatch: expected {expected}, got {got}")]
        DimensionMismatch { expected: usize, got: usize },

        #[error("the class list is empty")]
        EmptyClassList,

        #[error("unknown class: {0}")]
        UnknownClass(String),

        #[error("track {0} is not registered in this manager")]
        UnknownTrack(TrackId),

        #[error("covariance is not positive definite")]
        NotPositiveDefinite,
    }

    /// Result type for tracking operations
    pub type Result<T> = std::result::Result<T, TrackingError>;
}

//! Pairwise distance functions between a detection and a track.
//!
//! All functions take `(measurement, track)` in that order. The track side
//! is expected to carry the predicted measurement moments from its last
//! predict step; the measurement side only needs pose, size and
//! classification.

use crate::classification;
use crate::types::{DistanceType, TrackedObject};
use crate::Result;

/// Planar Euclidean distance between object centers.
pub fn euclidean_distance(measurement: &TrackedObject, track: &TrackedObject) -> f64 {
    (measurement.x - track.x).hypot(measurement.y - track.y)
}

/// Euclidean distance scaled by classification disagreement.
///
/// The scale is `1 + classification::distance`, so objects of conflicting
/// classes are pushed apart while agreement leaves the distance unchanged.
pub fn multiclass_scaled_distance(
    measurement: &TrackedObject,
    track: &TrackedObject,
) -> Result<f64> {
    let conflict =
        classification::distance(&measurement.classification, &track.classification)?;

    Ok(euclidean_distance(measurement, track) * (1.0 + conflict))
}

/// Mahalanobis distance under the track's predicted measurement covariance.
///
/// The yaw component of the innovation is forced to zero: 2D detectors
/// cannot observe orientation reliably enough to gate on it.
pub fn mahalanobis_distance(measurement: &TrackedObject, track: &TrackedObject) -> f64 {
    let mut innovation = measurement.measurement_vector() - &track.predicted_measurement_mean;
    innovation[6] = 0.0;

    let squared = (&track.predicted_measurement_cov_inv * &innovation).dot(&innovation);

    0.5 * squared.max(0.0).sqrt()
}

/// Equal-weight blend of the multi-class Euclidean and Mahalanobis
/// distances.
pub fn compound_distance(measurement: &TrackedObject, track: &TrackedObject) -> Result<f64> {
    let euclidean = multiclass_scaled_distance(measurement, track)?;
    let mahalanobis = mahalanobis_distance(measurement, track);

    Ok(0.5 * euclidean + 0.5 * mahalanobis)
}

/// Dispatch a distance computation by metric.
pub fn object_distance(
    distance_type: DistanceType,
    measurement: &TrackedObject,
    track: &TrackedObject,
) -> Result<f64> {
    match distance_type {
        DistanceType::Euclidean => Ok(euclidean_distance(measurement, track)),
        DistanceType::MultiClassEuclidean => multiclass_scaled_distance(measurement, track),
        DistanceType::Mahalanobis => Ok(mahalanobis_distance(measurement, track)),
        DistanceType::MCEMahalanobis => compound_distance(measurement, track),
    }
}

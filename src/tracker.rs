//! Frame-level tracking façades.
//!
//! [`MultipleObjectTracker`] is the full pipeline: split detections by
//! score, predict, associate in four passes (reliable tracks against
//! high-score detections, leftover reliable tracks against low-score
//! detections, then unreliable and suspended tracks against what remains),
//! correct, and give birth to tracks for the still-unmatched high-score
//! detections.
//!
//! [`IdTracker`] is the association-free variant for detectors that already
//! supply stable ids.

use crate::association::matcher::{match_objects, GatedHungarianMatcher};
use crate::manager::TrackManager;
use crate::types::{DistanceType, TrackedObject, TrackerConfig};
use crate::Result;

/// Keep only the elements at the given indices.
fn filter_by_index(elements: &[TrackedObject], index_to_keep: &[usize]) -> Vec<TrackedObject> {
    index_to_keep
        .iter()
        .map(|&index| elements[index].clone())
        .collect()
}

/// Partition detections into high- and low-score lists by their best class
/// probability.
fn split_by_threshold(
    objects: Vec<TrackedObject>,
    score_threshold: f64,
) -> (Vec<TrackedObject>, Vec<TrackedObject>) {
    objects
        .into_iter()
        .partition(|object| object.classification.max() >= score_threshold)
}

/// Multi-object tracker over anonymous detections.
pub struct MultipleObjectTracker {
    manager: TrackManager,
    matcher: GatedHungarianMatcher,
    distance_type: DistanceType,
    distance_threshold: f64,
    last_timestamp: f64,
}

impl Default for MultipleObjectTracker {
    fn default() -> Self {
        Self::with_config(TrackerConfig::default())
    }
}

impl MultipleObjectTracker {
    /// Tracker with the default association metric
    /// (multi-class Euclidean, threshold 5.0).
    pub fn with_config(config: TrackerConfig) -> Self {
        Self::new(config, DistanceType::MultiClassEuclidean, 5.0)
    }

    pub fn new(config: TrackerConfig, distance_type: DistanceType, distance_threshold: f64) -> Self {
        Self {
            manager: TrackManager::new(config, true),
            matcher: GatedHungarianMatcher::new(),
            distance_type,
            distance_threshold,
            last_timestamp: 0.0,
        }
    }

    /// Feed one frame of detections with the configured distance metric.
    pub fn track(
        &mut self,
        objects: Vec<TrackedObject>,
        timestamp: f64,
        score_threshold: f64,
    ) -> Result<()> {
        self.track_with(
            objects,
            timestamp,
            self.distance_type,
            self.distance_threshold,
            score_threshold,
        )
    }

    /// Feed one frame of detections with an explicit distance metric.
    pub fn track_with(
        &mut self,
        objects: Vec<TrackedObject>,
        timestamp: f64,
        distance_type: DistanceType,
        distance_threshold: f64,
        score_threshold: f64,
    ) -> Result<()> {
        // Negative intervals have no physical meaning; clamp defensively
        let dt = (timestamp - self.last_timestamp).max(0.0);

        if objects.is_empty() {
            self.manager.predict(dt)?;
            self.manager.correct()?;
            self.last_timestamp = timestamp;
            return Ok(());
        }

        let (objects, low_score_objects) = split_by_threshold(objects, score_threshold);

        self.manager.predict(dt)?;

        // First pass: reliable tracks against high-score detections
        let tracks = self.manager.reliable_tracks();
        let result = match_objects(
            &mut self.matcher,
            &tracks,
            &objects,
            distance_type,
            distance_threshold,
        )?;
        for &(track_index, object_index) in &result.assignments {
            self.manager
                .set_measurement(tracks[track_index].id, objects[object_index].clone());
        }
        let unassigned_objects = result.unassigned_cols;

        // Second pass: leftover reliable tracks against low-score detections
        let tracks = filter_by_index(&tracks, &result.unassigned_rows);
        let low_result = match_objects(
            &mut self.matcher,
            &tracks,
            &low_score_objects,
            distance_type,
            distance_threshold,
        )?;
        for &(track_index, object_index) in &low_result.assignments {
            self.manager.set_measurement(
                tracks[track_index].id,
                low_score_objects[object_index].clone(),
            );
        }

        // Third pass: unreliable tracks against the remaining high-score
        // detections
        let objects = filter_by_index(&objects, &unassigned_objects);
        let unreliable_tracks = self.manager.unreliable_tracks();
        let result = match_objects(
            &mut self.matcher,
            &unreliable_tracks,
            &objects,
            distance_type,
            distance_threshold,
        )?;
        for &(track_index, object_index) in &result.assignments {
            self.manager.set_measurement(
                unreliable_tracks[track_index].id,
                objects[object_index].clone(),
            );
        }

        // Fourth pass: suspended tracks against what is still unmatched
        let objects = filter_by_index(&objects, &result.unassigned_cols);
        let suspended_tracks = self.manager.suspended_tracks();
        let result = match_objects(
            &mut self.matcher,
            &suspended_tracks,
            &objects,
            distance_type,
            distance_threshold,
        )?;
        for &(track_index, object_index) in &result.assignments {
            self.manager.set_measurement(
                suspended_tracks[track_index].id,
                objects[object_index].clone(),
            );
        }

        self.manager.correct()?;

        // Birth: unmatched high-score detections become new tracks
        for &object_index in &result.unassigned_cols {
            self.manager
                .create_track(objects[object_index].clone(), timestamp);
        }

        self.last_timestamp = timestamp;
        Ok(())
    }

    /// States of every track, active and suspended.
    pub fn tracks(&self) -> Vec<TrackedObject> {
        self.manager.tracks()
    }

    /// States of the confirmed tracks.
    pub fn reliable_tracks(&self) -> Vec<TrackedObject> {
        self.manager.reliable_tracks()
    }

    /// Rederive the frame-count thresholds for a new frame rate.
    pub fn update_tracker_params(&mut self, frame_rate: u32) {
        self.manager.update_tracker_config(frame_rate);
    }

    /// Timestamp of the last processed frame.
    pub fn timestamp(&self) -> f64 {
        self.last_timestamp
    }

    /// The track manager behind this tracker.
    pub fn manager(&self) -> &TrackManager {
        &self.manager
    }
}

/// Tracker for detections that carry stable ids of their own.
///
/// No association is performed: measurements are routed to the track with
/// the same id, and unknown ids create new tracks. The manager runs with
/// auto-id generation disabled.
pub struct IdTracker {
    manager: TrackManager,
    last_timestamp: f64,
}

impl Default for IdTracker {
    fn default() -> Self {
        Self::with_config(TrackerConfig::default())
    }
}

impl IdTracker {
    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            manager: TrackManager::new(config, false),
            last_timestamp: 0.0,
        }
    }

    /// Feed one frame of id-carrying detections.
    pub fn track(&mut self, objects: Vec<TrackedObject>, timestamp: f64) -> Result<()> {
        let dt = (timestamp - self.last_timestamp).max(0.0);

        if objects.is_empty() {
            self.manager.predict(dt)?;
            self.manager.correct()?;
            self.last_timestamp = timestamp;
            return Ok(());
        }

        self.manager.predict(dt)?;

        for object in &objects {
            if self.manager.has_id(object.id) {
                self.manager.set_measurement(object.id, object.clone());
            }
        }

        self.manager.correct()?;

        for object in objects {
            if !self.manager.has_id(object.id) {
                self.manager.create_track(object, timestamp);
            }
        }

        self.last_timestamp = timestamp;
        Ok(())
    }

    /// States of every track, active and suspended.
    pub fn tracks(&self) -> Vec<TrackedObject> {
        self.manager.tracks()
    }

    /// States of the confirmed tracks.
    pub fn reliable_tracks(&self) -> Vec<TrackedObject> {
        self.manager.reliable_tracks()
    }

    /// Timestamp of the last processed frame.
    pub fn timestamp(&self) -> f64 {
        self.last_timestamp
    }

    /// The track manager behind this tracker.
    pub fn manager(&self) -> &TrackManager {
        &self.manager
    }
}

//! Track ownership and lifecycle.
//!
//! The manager owns one IMM estimator per track, keyed by id, plus the
//! per-track counters that drive the lifecycle state machine:
//!
//! - a track is **unreliable** until it has been corrected
//!   `max_unreliable_frames` times, then **reliable**;
//! - a reliable *static* track that misses too many consecutive frames is
//!   **suspended** (frozen, not propagated) instead of deleted, so a
//!   parked object can be picked up again later;
//! - a reliable *dynamic* track that misses too many frames is deleted, as
//!   is an unreliable track;
//! - a suspended track is reactivated by any new matching measurement and
//!   only needs a short confirmation to become reliable again.
//!
//! Measurements are staged with [`TrackManager::set_measurement`] between a
//! [`predict`](TrackManager::predict) and the
//! [`correct`](TrackManager::correct) that consumes them.

use std::collections::HashMap;

use log::{debug, info};

use crate::filter::ImmEstimator;
use crate::types::{TrackId, TrackedObject, TrackerConfig};
use crate::{Result, TrackingError};

/// Owner of all track estimators and their lifecycle state.
pub struct TrackManager {
    estimators: HashMap<TrackId, ImmEstimator>,
    suspended_estimators: HashMap<TrackId, ImmEstimator>,

    /// Staged measurements, consumed by the next correct
    pending_measurements: HashMap<TrackId, TrackedObject>,
    /// Consecutive frames without a measurement, per active track
    non_measurement_frames: HashMap<TrackId, u32>,
    /// Total corrected frames, per track
    tracked_frames: HashMap<TrackId, u32>,

    current_id: TrackId,
    auto_id_generation: bool,

    config: TrackerConfig,
}

impl Default for TrackManager {
    fn default() -> Self {
        Self::new(TrackerConfig::default(), true)
    }
}

impl TrackManager {
    pub fn new(config: TrackerConfig, auto_id_generation: bool) -> Self {
        Self {
            estimators: HashMap::new(),
            suspended_estimators: HashMap::new(),
            pending_measurements: HashMap::new(),
            non_measurement_frames: HashMap::new(),
            tracked_frames: HashMap::new(),
            current_id: 0,
            auto_id_generation,
            config,
        }
    }

    /// Create a new track initialised at `object`.
    ///
    /// With auto-id generation the object's id is replaced by the next
    /// generated one; otherwise the object's own id is used. Returns the id
    /// under which the track is registered.
    pub fn create_track(&mut self, mut object: TrackedObject, timestamp: f64) -> TrackId {
        if self.auto_id_generation {
            self.current_id += 1;
            object.id = self.current_id;
        }
        let id = object.id;

        let estimator = ImmEstimator::new(
            object,
            timestamp,
            self.config.default_process_noise,
            self.config.default_measurement_noise,
            self.config.init_state_covariance,
            &self.config.motion_models,
        );

        self.estimators.insert(id, estimator);
        self.non_measurement_frames.insert(id, 0);
        self.tracked_frames.insert(id, 0);

        debug!("created track {id}");
        id
    }

    /// Remove a track entirely, suspended or not.
    pub fn delete_track(&mut self, id: TrackId) {
        if self.is_suspended(id) {
            self.reactivate_track(id);
        }

        self.estimators.remove(&id);
        self.non_measurement_frames.remove(&id);
        self.tracked_frames.remove(&id);
    }

    /// Freeze a track: it keeps its state but is no longer propagated.
    pub fn suspend_track(&mut self, id: TrackId) {
        if let Some(estimator) = self.estimators.remove(&id) {
            self.suspended_estimators.insert(id, estimator);
            self.non_measurement_frames.remove(&id);
        }
    }

    /// Move a suspended track back into the active set.
    ///
    /// Its confirmation counter is rewound so a short run of corrections
    /// suffices to make it reliable again.
    pub fn reactivate_track(&mut self, id: TrackId) {
        if let Some(estimator) = self.suspended_estimators.remove(&id) {
            self.estimators.insert(id, estimator);
            self.non_measurement_frames.insert(id, 0);
            self.tracked_frames.insert(
                id,
                self.config
                    .max_unreliable_frames
                    .saturating_sub(self.config.reactivation_frames),
            );
        }
    }

    /// Propagate every active estimator up to `timestamp` (seconds).
    ///
    /// Suspended estimators are frozen: they are not propagated, so their
    /// reported state stays stale for the duration of the suspension. Any
    /// staged measurements are discarded.
    pub fn predict_to(&mut self, timestamp: f64) -> Result<()> {
        for estimator in self.estimators.values_mut() {
            estimator.predict_to(timestamp)?;
        }

        self.pending_measurements.clear();
        Ok(())
    }

    /// Propagate every active estimator forward by `dt` seconds.
    ///
    /// See [`predict_to`](Self::predict_to) for the suspension semantics.
    pub fn predict(&mut self, dt: f64) -> Result<()> {
        for estimator in self.estimators.values_mut() {
            estimator.predict(dt)?;
        }

        self.pending_measurements.clear();
        Ok(())
    }

    /// Stage a measurement for `id`, replacing any already staged one.
    ///
    /// The measurement is applied by the next [`correct`](Self::correct).
    pub fn set_measurement(&mut self, id: TrackId, measurement: TrackedObject) {
        self.pending_measurements.insert(id, measurement);
    }

    /// Apply all staged measurements and run the lifecycle transitions.
    pub fn correct(&mut self) -> Result<()> {
        // Correct matched tracks, advance the miss counter on the rest
        for (&id, estimator) in self.estimators.iter_mut() {
            if let Some(measurement) = self.pending_measurements.get(&id) {
                estimator.correct(measurement)?;

                self.non_measurement_frames.insert(id, 0);
                *self.tracked_frames.entry(id).or_insert(0) += 1;
            } else {
                *self.non_measurement_frames.entry(id).or_insert(0) += 1;
            }
        }

        // A measurement for a suspended track brings it back
        let reactivation_list: Vec<TrackId> = self
            .suspended_estimators
            .keys()
            .copied()
            .filter(|id| self.pending_measurements.contains_key(id))
            .collect();

        for id in reactivation_list {
            self.reactivate_track(id);
            if let (Some(estimator), Some(measurement)) = (
                self.estimators.get_mut(&id),
                self.pending_measurements.get(&id),
            ) {
                estimator.correct(measurement)?;
            }
        }

        // Lifecycle: suspend quiet static tracks, delete lost ones
        let mut deletion_list: Vec<TrackId> = Vec::new();
        let mut suspend_list: Vec<TrackId> = Vec::new();

        for (&id, &misses) in &self.non_measurement_frames {
            if self.is_reliable(id) {
                let dynamic = self
                    .estimators
                    .get(&id)
                    .map(|e| e.current_state().is_dynamic())
                    .unwrap_or(false);

                if dynamic {
                    if misses > self.config.non_measurement_frames_dynamic {
                        deletion_list.push(id);
                    }
                } else if misses > self.config.non_measurement_frames_static {
                    suspend_list.push(id);
                }
            } else if misses > self.config.non_measurement_frames_dynamic {
                deletion_list.push(id);
            }
        }

        for id in deletion_list {
            debug!("deleting lost track {id}");
            self.delete_track(id);
        }
        for id in suspend_list {
            debug!("suspending static track {id}");
            self.suspend_track(id);
        }

        Ok(())
    }

    /// States of every track, active and suspended.
    pub fn tracks(&self) -> Vec<TrackedObject> {
        self.estimators
            .values()
            .chain(self.suspended_estimators.values())
            .map(|e| e.current_state().clone())
            .collect()
    }

    /// States of tracks that have been confirmed long enough to trust.
    pub fn reliable_tracks(&self) -> Vec<TrackedObject> {
        self.estimators
            .iter()
            .filter(|(&id, _)| self.is_reliable(id))
            .map(|(_, e)| e.current_state().clone())
            .collect()
    }

    /// States of tracks still in their confirmation window.
    pub fn unreliable_tracks(&self) -> Vec<TrackedObject> {
        self.estimators
            .iter()
            .filter(|(&id, _)| !self.is_reliable(id))
            .map(|(_, e)| e.current_state().clone())
            .collect()
    }

    /// States of suspended (frozen) tracks.
    pub fn suspended_tracks(&self) -> Vec<TrackedObject> {
        self.suspended_estimators
            .values()
            .map(|e| e.current_state().clone())
            .collect()
    }

    /// Reliable tracks that have been coasting for more than half the
    /// dynamic miss budget.
    pub fn drifting_tracks(&self) -> Vec<TrackedObject> {
        self.estimators
            .iter()
            .filter(|(&id, _)| {
                self.is_reliable(id)
                    && self
                        .non_measurement_frames
                        .get(&id)
                        .map(|&misses| misses > self.config.non_measurement_frames_dynamic / 2)
                        .unwrap_or(false)
            })
            .map(|(_, e)| e.current_state().clone())
            .collect()
    }

    /// State of one track, active or suspended.
    pub fn track(&self, id: TrackId) -> Result<TrackedObject> {
        Ok(self.estimator(id)?.current_state().clone())
    }

    /// The estimator behind a track, active or suspended.
    pub fn estimator(&self, id: TrackId) -> Result<&ImmEstimator> {
        self.estimators
            .get(&id)
            .or_else(|| self.suspended_estimators.get(&id))
            .ok_or(TrackingError::UnknownTrack(id))
    }

    /// Whether `id` is registered, active or suspended.
    pub fn has_id(&self, id: TrackId) -> bool {
        self.estimators.contains_key(&id) || self.suspended_estimators.contains_key(&id)
    }

    /// A track is reliable once it has been corrected often enough.
    pub fn is_reliable(&self, id: TrackId) -> bool {
        self.tracked_frames
            .get(&id)
            .map(|&frames| frames >= self.config.max_unreliable_frames)
            .unwrap_or(false)
    }

    /// Whether `id` is currently suspended.
    pub fn is_suspended(&self, id: TrackId) -> bool {
        self.suspended_estimators.contains_key(&id)
    }

    /// Rederive the frame-count thresholds from the time-domain thresholds
    /// for a given frame rate.
    pub fn update_tracker_config(&mut self, frame_rate: u32) {
        let frames = |seconds: f64| (frame_rate as f64 * seconds).ceil() as u32;

        self.config.max_unreliable_frames = frames(self.config.max_unreliable_time);
        self.config.non_measurement_frames_dynamic =
            frames(self.config.non_measurement_time_dynamic);
        self.config.non_measurement_frames_static =
            frames(self.config.non_measurement_time_static);

        info!(
            "updated tracker thresholds for {frame_rate} fps: max_unreliable_frames={}, \
             non_measurement_frames_dynamic={}, non_measurement_frames_static={}",
            self.config.max_unreliable_frames,
            self.config.non_measurement_frames_dynamic,
            self.config.non_measurement_frames_static,
        );
    }

    /// The manager's configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationData;

    fn detection(x: f64, y: f64) -> TrackedObject {
        let classes =
            ClassificationData::new(vec!["Car".into(), "Bike".into(), "Pedestrian".into()])
                .unwrap();

        let mut object = TrackedObject::default();
        object.x = x;
        object.y = y;
        object.length = 2.0;
        object.width = 1.0;
        object.classification = classes.classification("Car", 1.0).unwrap();
        object
    }

    fn config() -> TrackerConfig {
        TrackerConfig {
            max_unreliable_frames: 2,
            non_measurement_frames_dynamic: 3,
            non_measurement_frames_static: 5,
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_create_track_round_trip() {
        let mut manager = TrackManager::new(config(), true);
        let id = manager.create_track(detection(4.0, -2.0), 0.0);

        let track = manager.track(id).unwrap();
        assert_eq!(track.id, id);
        assert_eq!(track.x, 4.0);
        assert_eq!(track.y, -2.0);
        assert!(manager.has_id(id));
        assert!(manager.track(id + 1).is_err());
    }

    #[test]
    fn test_auto_id_increments() {
        let mut manager = TrackManager::new(config(), true);
        let a = manager.create_track(detection(0.0, 0.0), 0.0);
        let b = manager.create_track(detection(10.0, 0.0), 0.0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_external_ids_preserved() {
        let mut manager = TrackManager::new(config(), false);
        let mut object = detection(0.0, 0.0);
        object.id = 42;

        let id = manager.create_track(object, 0.0);
        assert_eq!(id, 42);
        assert!(manager.has_id(42));
    }

    #[test]
    fn test_reliability_promotion() {
        let mut manager = TrackManager::new(config(), true);
        let id = manager.create_track(detection(0.0, 0.0), 0.0);

        assert!(!manager.is_reliable(id));
        assert_eq!(manager.unreliable_tracks().len(), 1);

        for step in 1..=2 {
            let t = step as f64 * 0.1;
            manager.predict_to(t).unwrap();
            manager.set_measurement(id, detection(0.0, 0.0));
            manager.correct().unwrap();
        }

        assert!(manager.is_reliable(id));
        assert_eq!(manager.reliable_tracks().len(), 1);
        assert_eq!(manager.unreliable_tracks().len(), 0);
    }

    #[test]
    fn test_unreliable_track_deleted_after_misses() {
        let mut manager = TrackManager::new(config(), true);
        let id = manager.create_track(detection(0.0, 0.0), 0.0);

        // Never measured again: four misses exceed the dynamic budget of 3
        for step in 1..=4 {
            manager.predict_to(step as f64 * 0.1).unwrap();
            manager.correct().unwrap();
        }

        assert!(!manager.has_id(id));
    }

    #[test]
    fn test_static_reliable_track_suspends_and_reactivates() {
        let mut manager = TrackManager::new(config(), true);
        let id = manager.create_track(detection(5.0, 5.0), 0.0);

        // Promote to reliable with a static (zero-velocity) object
        for step in 1..=3 {
            manager.predict_to(step as f64 * 0.1).unwrap();
            manager.set_measurement(id, detection(5.0, 5.0));
            manager.correct().unwrap();
        }
        assert!(manager.is_reliable(id));

        // Starve it: six misses exceed the static budget of 5
        for step in 4..=9 {
            manager.predict_to(step as f64 * 0.1).unwrap();
            manager.correct().unwrap();
        }

        assert!(manager.is_suspended(id));
        assert!(manager.has_id(id));
        assert_eq!(manager.suspended_tracks().len(), 1);
        assert!(manager.tracks().iter().any(|t| t.id == id));

        // A new measurement reactivates it; tracked_frames restarts at
        // max_unreliable - reactivation = 1, so one confirmation remains
        manager.predict_to(1.0).unwrap();
        manager.set_measurement(id, detection(5.0, 5.0));
        manager.correct().unwrap();

        assert!(!manager.is_suspended(id));
        assert!(!manager.is_reliable(id));

        manager.predict_to(1.1).unwrap();
        manager.set_measurement(id, detection(5.0, 5.0));
        manager.correct().unwrap();

        assert!(manager.is_reliable(id));
    }

    #[test]
    fn test_suspended_tracks_are_frozen() {
        let mut manager = TrackManager::new(config(), true);
        let id = manager.create_track(detection(5.0, 5.0), 0.0);

        for step in 1..=3 {
            manager.predict_to(step as f64 * 0.1).unwrap();
            manager.set_measurement(id, detection(5.0, 5.0));
            manager.correct().unwrap();
        }
        for step in 4..=9 {
            manager.predict_to(step as f64 * 0.1).unwrap();
            manager.correct().unwrap();
        }
        assert!(manager.is_suspended(id));

        let frozen = manager.track(id).unwrap();
        manager.predict_to(100.0).unwrap();

        let after = manager.track(id).unwrap();
        assert_eq!(frozen.x, after.x);
        assert_eq!(frozen.y, after.y);
    }

    #[test]
    fn test_drifting_tracks() {
        let mut manager = TrackManager::new(
            TrackerConfig {
                max_unreliable_frames: 1,
                non_measurement_frames_dynamic: 6,
                ..TrackerConfig::default()
            },
            true,
        );

        // A moving object so the track stays dynamic
        let id = manager.create_track(detection(0.0, 0.0), 0.0);
        for step in 1..=3 {
            let t = step as f64 * 0.1;
            let mut object = detection(2.0 * t, 0.0);
            object.vx = 2.0;
            manager.predict_to(t).unwrap();
            manager.set_measurement(id, object);
            manager.correct().unwrap();
        }
        assert!(manager.drifting_tracks().is_empty());

        // Four misses: over half the dynamic budget, still under deletion
        for step in 4..=7 {
            manager.predict_to(step as f64 * 0.1).unwrap();
            manager.correct().unwrap();
        }

        assert_eq!(manager.drifting_tracks().len(), 1);
        assert!(manager.has_id(id));
    }

    #[test]
    fn test_update_tracker_config_rederives_thresholds() {
        let mut manager = TrackManager::new(TrackerConfig::default(), true);
        manager.update_tracker_config(30);

        // ceil(30 * 0.3333) = 10, ceil(30 * 0.2666) = 8, ceil(30 * 0.5333) = 16
        assert_eq!(manager.config().max_unreliable_frames, 10);
        assert_eq!(manager.config().non_measurement_frames_dynamic, 8);
        assert_eq!(manager.config().non_measurement_frames_static, 16);
    }

    #[test]
    fn test_predict_clears_pending_measurements() {
        let mut manager = TrackManager::new(config(), true);
        let id = manager.create_track(detection(0.0, 0.0), 0.0);

        manager.set_measurement(id, detection(0.0, 0.0));
        manager.predict_to(0.1).unwrap();
        // The staged measurement was dropped by predict, so this counts as
        // a miss
        manager.correct().unwrap();

        assert_eq!(*manager.non_measurement_frames.get(&id).unwrap(), 1);
    }
}

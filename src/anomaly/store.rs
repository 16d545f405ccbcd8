//! Per-sensor matrix-profile state store.
//!
//! Process-scoped map from sensor id to [`SensorProfile`], created lazily on
//! first sample. Each profile has a single writer (its sensor's engine task);
//! the map itself is owned by the pipeline's runtime state.

use std::collections::{HashMap, VecDeque};

use crate::matrix_profile::StreamingProfile;
use crate::types::Sensor;
use crate::MonitorError;

/// Decode an opaque baseline blob into a live streaming profile.
///
/// Blobs are serialized [`StreamingProfile`] state; the system otherwise
/// treats them as bytes.
pub fn decode_baseline(blob: &[u8]) -> Result<StreamingProfile, MonitorError> {
    serde_json::from_slice(blob)
        .map_err(|e| MonitorError::Unprocessable(format!("undecodable baseline blob: {e}")))
}

/// Serialize a streaming profile into the opaque blob form.
pub fn encode_baseline(profile: &StreamingProfile) -> Vec<u8> {
    // StreamingProfile contains only plain vectors; serialization cannot fail
    serde_json::to_vec(profile).unwrap_or_default()
}

/// Live matrix-profile state for one sensor.
///
/// Invariants (checked by the engine after every update):
/// - `last_values.len() <= 2 * W` at all times
/// - `counter <= 2 * W`; right after a reset `counter == W` and
///   `last_values.len() == W`
/// - `initial` is immutable for the life of the process
#[derive(Debug, Clone)]
pub struct SensorProfile {
    /// Immutable seed baseline, deserialized once from the sensor's blob
    initial: StreamingProfile,
    /// Live streaming baseline scored every sample
    pub baseline: StreamingProfile,
    /// Samples appended since creation, reset to W at the 2W boundary
    pub counter: usize,
    /// Normalization constant: max profile value of the seed baseline
    pub max_distance: f64,
    /// Rolling window of the last accepted values (<= 2W)
    pub last_values: VecDeque<f64>,
    /// Sticky: the engine has seen at least W samples for this sensor
    pub full_capacity: bool,

    /// Feedback twin seed, grows as operator-approved excursions are absorbed
    pub fb_baseline_start: StreamingProfile,
    /// Live feedback baseline
    pub fb_baseline: StreamingProfile,
    pub fb_max_distance: f64,
    /// All values ever absorbed through feedback finalization
    pub fb_historical: Vec<f64>,
    /// Values observed during the current feedback session
    pub fb_temp: Vec<f64>,
}

impl SensorProfile {
    fn from_seed(seed: StreamingProfile) -> Self {
        let max_distance = seed.max_profile_value();
        Self {
            baseline: seed.clone(),
            counter: 0,
            max_distance,
            last_values: VecDeque::new(),
            full_capacity: false,
            fb_baseline_start: seed.clone(),
            fb_baseline: seed.clone(),
            fb_max_distance: max_distance,
            fb_historical: Vec::new(),
            fb_temp: Vec::new(),
            initial: seed,
        }
    }

    /// Fresh copy of the immutable seed baseline.
    pub fn initial_copy(&self) -> StreamingProfile {
        self.initial.clone()
    }

    /// Rebuild all live state from the seed. Used for Fatal recovery and
    /// baseline adoption.
    pub fn rebuild(&mut self) {
        *self = Self::from_seed(self.initial.clone());
    }
}

/// Process-scoped mapping from sensor id to live profile state. No eviction.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: HashMap<String, SensorProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the sensor's profile, deserializing its initial baseline blob on
    /// first access.
    pub fn get_or_create(&mut self, sensor: &Sensor) -> Result<&mut SensorProfile, MonitorError> {
        if !self.profiles.contains_key(&sensor.id) {
            let seed = decode_baseline(&sensor.config.initial_baseline)?;
            tracing::debug!(
                sensor = %sensor.id,
                seed_len = seed.series_len(),
                max_distance = seed.max_profile_value(),
                "Created matrix profile from initial baseline"
            );
            self.profiles
                .insert(sensor.id.clone(), SensorProfile::from_seed(seed));
        }
        // Entry guaranteed by the insert above
        self.profiles
            .get_mut(&sensor.id)
            .ok_or_else(|| MonitorError::Fatal("profile vanished after insert".into()))
    }

    pub fn get(&self, sensor_id: &str) -> Option<&SensorProfile> {
        self.profiles.get(sensor_id)
    }

    pub fn get_mut(&mut self, sensor_id: &str) -> Option<&mut SensorProfile> {
        self.profiles.get_mut(sensor_id)
    }

    /// Replace a sensor's seed baseline (baseline-selection adoption) and
    /// rebuild its live state.
    pub fn adopt_baseline(
        &mut self,
        sensor_id: &str,
        blob: &[u8],
    ) -> Result<(), MonitorError> {
        let seed = decode_baseline(blob)?;
        self.profiles
            .insert(sensor_id.to_string(), SensorProfile::from_seed(seed));
        tracing::info!(sensor = %sensor_id, "Adopted new initial baseline");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, SensorConfig};

    fn test_sensor(blob: Vec<u8>) -> Sensor {
        Sensor {
            id: "S1".into(),
            position: Position::new(1.0, 2.0, 3.0),
            template_id: "T1".into(),
            config: SensorConfig {
                initial_baseline: blob,
                interactive_feedback_mode: false,
            },
        }
    }

    #[test]
    fn test_blob_round_trip() {
        let seed = StreamingProfile::from_series(
            &(0..32).map(|i| (i as f64 * 0.4).sin()).collect::<Vec<_>>(),
            8,
        );
        let blob = encode_baseline(&seed);
        let decoded = decode_baseline(&blob).unwrap();
        assert_eq!(seed, decoded);
    }

    #[test]
    fn test_lazy_creation_and_single_instance() {
        let seed = StreamingProfile::from_series(&vec![2.0; 32], 8);
        let sensor = test_sensor(encode_baseline(&seed));
        let mut store = ProfileStore::new();
        assert!(store.is_empty());

        store.get_or_create(&sensor).unwrap().counter = 7;
        // Second access returns the same live state, not a fresh copy
        assert_eq!(store.get_or_create(&sensor).unwrap().counter, 7);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_bad_blob_is_unprocessable() {
        let sensor = test_sensor(b"not json".to_vec());
        let mut store = ProfileStore::new();
        assert!(matches!(
            store.get_or_create(&sensor),
            Err(MonitorError::Unprocessable(_))
        ));
    }
}

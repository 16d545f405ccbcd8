//! Runtime state shared across pipeline tasks.
//!
//! Consolidates the per-sensor anomaly state, the event debouncer, and the
//! static catalogue behind a single lock. Each sensor has exactly one
//! writer task, so lock contention stays on the few shared maps.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::anomaly::{select_baseline, AnomalyEngine, SeedBaseline, SelectionOutcome};
use crate::config::AnomalyDetectionConfig;
use crate::error::MonitorError;
use crate::events::EventDispatcher;
use crate::types::{Current, Leak, Sensor, Template, Wave};

/// Everything the pipeline tasks mutate or look up at runtime.
///
/// Wrapped in `Arc<Mutex<>>` by the orchestrator.
pub struct RuntimeState {
    pub engine: AnomalyEngine,
    pub dispatcher: EventDispatcher,

    /// sensor id -> sensor record
    pub sensors: HashMap<String, Sensor>,
    /// template id -> template record
    pub templates: HashMap<String, Template>,
    /// template id -> catalogued leaks, in catalogue order
    pub leaks: HashMap<String, Vec<Leak>>,

    /// Current series aligned with the sample cadence, oldest first
    pub currents: Vec<Current>,
    /// Wave series aligned with `currents`
    pub waves: Vec<Wave>,

    /// Candidate seeds for periodic baseline selection; empty disables it
    pub seed_bank: Vec<SeedBaseline>,
    /// Per-sensor history accumulated for selection, capped at the limit
    selection_histories: HashMap<String, Vec<f64>>,
    /// Per-sensor samples since the last selection run
    samples_since_selection: HashMap<String, usize>,
}

impl RuntimeState {
    pub fn new(engine: AnomalyEngine) -> Self {
        Self {
            engine,
            dispatcher: EventDispatcher::new(),
            sensors: HashMap::new(),
            templates: HashMap::new(),
            leaks: HashMap::new(),
            currents: Vec::new(),
            waves: Vec::new(),
            seed_bank: Vec::new(),
            selection_histories: HashMap::new(),
            samples_since_selection: HashMap::new(),
        }
    }

    /// Register a sensor and its template membership with the dispatcher.
    pub fn add_sensor(&mut self, sensor: Sensor) {
        self.dispatcher
            .register_sensor(&sensor.id, &sensor.template_id);
        self.sensors.insert(sensor.id.clone(), sensor);
    }

    pub fn add_template(&mut self, template: Template, leaks: Vec<Leak>) {
        self.leaks.insert(template.id.clone(), leaks);
        self.templates.insert(template.id.clone(), template);
    }

    /// Most recent measured window of a sensor, oldest first, or `None`
    /// before the sensor reaches capacity.
    pub fn measured_window(&self, sensor_id: &str, w: usize) -> Option<Vec<f64>> {
        let profile = self.engine.store().get(sensor_id)?;
        if profile.last_values.len() < w {
            return None;
        }
        let skip = profile.last_values.len() - w;
        Some(profile.last_values.iter().skip(skip).cloned().collect())
    }

    /// Accumulate one sample toward the sensor's next baseline-selection
    /// run. Returns true when `limit` samples have arrived since the last
    /// run and selection is due.
    ///
    /// A no-op when the seed bank is empty.
    pub fn record_for_selection(&mut self, sensor_id: &str, value: f64, limit: usize) -> bool {
        if self.seed_bank.is_empty() || limit == 0 {
            return false;
        }
        let history = self
            .selection_histories
            .entry(sensor_id.to_string())
            .or_default();
        history.push(value);
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }
        let since = self
            .samples_since_selection
            .entry(sensor_id.to_string())
            .or_default();
        *since += 1;
        if *since >= limit {
            *since = 0;
            true
        } else {
            false
        }
    }

    /// One baseline-selection cycle for a sensor: clean its accumulated
    /// history, score the seed bank against it, and adopt the winner.
    ///
    /// `Ok(None)` means no seed qualified this cycle; the sensor keeps its
    /// current baseline. `NotEnoughHistory` means cleaning left fewer than
    /// `W` samples and the cycle is skipped.
    pub fn run_baseline_selection(
        &mut self,
        sensor_id: &str,
        cfg: &AnomalyDetectionConfig,
    ) -> Result<Option<SelectionOutcome>, MonitorError> {
        let Some(history) = self.selection_histories.get(sensor_id) else {
            return Ok(None);
        };
        let outcome = select_baseline(history, &self.seed_bank, cfg)?;
        match &outcome {
            Some(o) => {
                self.engine
                    .store_mut()
                    .adopt_baseline(sensor_id, &self.seed_bank[o.seed_index].blob)?;
                info!(
                    sensor = %sensor_id,
                    seed = %self.seed_bank[o.seed_index].name,
                    stats_distance = o.stats_distance,
                    "baseline selection adopted a seed"
                );
            }
            None => {
                debug!(sensor = %sensor_id, "baseline selection: no seed qualified");
            }
        }
        Ok(outcome)
    }

    /// Recent windows of the other sensors on the same template, for the
    /// neighbor correlation check. Sensors without a full window are
    /// silently skipped.
    pub fn neighbor_windows(&self, sensor_id: &str, w: usize) -> Vec<Vec<f64>> {
        let Some(template_id) = self.sensors.get(sensor_id).map(|s| s.template_id.clone()) else {
            return Vec::new();
        };
        self.sensors
            .values()
            .filter(|s| s.id != sensor_id && s.template_id == template_id)
            .filter_map(|s| self.measured_window(&s.id, w))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnomalyDetectionConfig;
    use crate::types::{Position, SensorConfig};

    fn sensor(id: &str) -> Sensor {
        Sensor {
            id: id.into(),
            position: Position::new(10.0, 0.0, 4.0),
            template_id: "T1".into(),
            config: SensorConfig {
                initial_baseline: Vec::new(),
                interactive_feedback_mode: false,
            },
        }
    }

    #[test]
    fn test_neighbor_windows_exclude_self_and_short() {
        let mut state = RuntimeState::new(AnomalyEngine::new(AnomalyDetectionConfig::default()));
        state.add_sensor(sensor("S1"));
        state.add_sensor(sensor("S2"));
        // Neither sensor has any history yet
        assert!(state.neighbor_windows("S1", 16).is_empty());
        assert!(state.measured_window("S1", 16).is_none());
    }

    #[test]
    fn test_selection_cadence_follows_limit() {
        let mut state = RuntimeState::new(AnomalyEngine::new(AnomalyDetectionConfig::default()));
        // Empty seed bank disables accumulation entirely
        assert!(!state.record_for_selection("S1", 2.0, 4));

        state.seed_bank = vec![flat_seed("flat")];
        let mut due = Vec::new();
        for i in 0..12 {
            if state.record_for_selection("S1", 2.0, 4) {
                due.push(i);
            }
        }
        assert_eq!(due, vec![3, 7, 11]);
    }

    #[test]
    fn test_selection_adopts_matching_seed() {
        let w = 16;
        let cfg = AnomalyDetectionConfig {
            window_size: w,
            ..AnomalyDetectionConfig::default()
        };
        let mut state = RuntimeState::new(AnomalyEngine::new(cfg.clone()));
        state.seed_bank = vec![flat_seed("flat")];

        let limit = 4 * w;
        let mut due = false;
        for _ in 0..limit {
            due = state.record_for_selection("S1", 2.0, limit);
        }
        assert!(due);

        let outcome = state
            .run_baseline_selection("S1", &cfg)
            .unwrap()
            .expect("flat seed should qualify on flat history");
        assert_eq!(outcome.seed_index, 0);
        // Adoption rebuilt the sensor's profile from the new seed
        assert!(state.engine.store().get("S1").is_some());
    }

    fn flat_seed(name: &str) -> crate::anomaly::SeedBaseline {
        use crate::anomaly::encode_baseline;
        use crate::matrix_profile::StreamingProfile;
        let series = vec![2.0; 64];
        let profile = StreamingProfile::from_series(&series, 16);
        crate::anomaly::SeedBaseline {
            name: name.into(),
            max_distance: profile.max_profile_value().max(1.0),
            blob: encode_baseline(&profile),
            variance: 0.0,
            skew: 0.0,
        }
    }
}

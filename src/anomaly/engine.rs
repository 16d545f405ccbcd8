//! Online anomaly engine — matrix-profile scoring of every incoming sample.
//!
//! One operation: [`AnomalyEngine::process`], returning the sample's
//! deviation class and the mode it was evaluated in. The engine never fails:
//! missing history yields `Deviation::Undefined`, internal inconsistencies
//! rebuild the sensor's profile from its seed baseline.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::config::AnomalyDetectionConfig;
use crate::types::{Deviation, Sample, Sensor};

use super::store::{ProfileStore, SensorProfile};

/// Floor under the normalization constant; a degenerate (all-zero) seed
/// profile must not divide away real deviations.
const MAX_DISTANCE_FLOOR: f64 = 1e-9;

/// Mode a sample was evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMode {
    Off,
    On,
}

/// Classify a deviation percentage against the configured thresholds.
pub(crate) fn classify(d: f64, warning: f64, alert: f64) -> Deviation {
    if d < warning {
        Deviation::Ok
    } else if d < alert {
        Deviation::Warning
    } else {
        Deviation::Critical
    }
}

/// Streaming anomaly engine over all sensors of one pipeline.
///
/// Owns the profile store and the per-sensor mode cache (the runtime-state
/// consolidation of what used to be module-level maps). Single writer per
/// sensor profile — the orchestrator serializes access per sensor task.
pub struct AnomalyEngine {
    cfg: AnomalyDetectionConfig,
    store: ProfileStore,
    /// Last observed feedback-mode flag per sensor, for transition detection
    last_mode: HashMap<String, bool>,
}

impl AnomalyEngine {
    pub fn new(cfg: AnomalyDetectionConfig) -> Self {
        Self {
            cfg,
            store: ProfileStore::new(),
            last_mode: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AnomalyDetectionConfig {
        &self.cfg
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ProfileStore {
        &mut self.store
    }

    /// Score one sample.
    ///
    /// Decides the mode from the sensor's configured flag versus the last
    /// observed one, updates the selected baseline, and classifies. Emits
    /// `Undefined` until W samples have been seen for this sensor.
    pub fn process(&mut self, sensor: &Sensor, sample: &Sample) -> (Deviation, FeedbackMode) {
        let w = self.cfg.window_size;
        let desired = sensor.config.interactive_feedback_mode;
        let previous = self
            .last_mode
            .insert(sensor.id.clone(), desired)
            .unwrap_or(false);

        let save_limit = self.cfg.interactive_feedback_save_max_limit;
        let warning = self.cfg.warning;
        let alert = self.cfg.alert;

        let profile = match self.store.get_or_create(sensor) {
            Ok(p) => p,
            Err(e) => {
                warn!(sensor = %sensor.id, error = %e, "Cannot materialize baseline; sample unclassified");
                return (Deviation::Undefined, FeedbackMode::Off);
            }
        };

        // Mode transitions
        if desired && !previous {
            enter_feedback(profile, w);
            debug!(sensor = %sensor.id, "Interactive feedback ON");
        } else if !desired && previous {
            finalize_feedback(profile, save_limit);
            debug!(sensor = %sensor.id, "Interactive feedback OFF, session finalized");
        }

        let mode = if desired {
            FeedbackMode::On
        } else {
            FeedbackMode::Off
        };

        // Update the baseline pair selected by the mode
        match mode {
            FeedbackMode::Off => update_normal(profile, w, sample.ppmv),
            FeedbackMode::On => update_feedback(profile, w, sample.ppmv),
        }

        // Invariant check: counter and last_values must stay within 2W.
        // A violation means the reset logic has been bypassed; rebuild.
        if profile.counter > 2 * w || profile.last_values.len() > 2 * w {
            error!(
                sensor = %sensor.id,
                counter = profile.counter,
                last_values = profile.last_values.len(),
                "Matrix profile state inconsistent; rebuilding from initial baseline"
            );
            profile.rebuild();
            self.last_mode.insert(sensor.id.clone(), false);
            return (Deviation::Undefined, FeedbackMode::Off);
        }

        if profile.counter >= w {
            profile.full_capacity = true;
        }
        if !profile.full_capacity {
            return (Deviation::Undefined, mode);
        }

        // Classification
        let deviation = match mode {
            FeedbackMode::On => match deviation_pct(
                profile.fb_baseline.last_profile_value(),
                profile.fb_max_distance,
            ) {
                Some(d) => classify(d, warning, alert),
                None => Deviation::Undefined,
            },
            FeedbackMode::Off => {
                let d_normal =
                    deviation_pct(profile.baseline.last_profile_value(), profile.max_distance);

                // Once operator-approved excursions exist, the feedback twin
                // is kept current and scored alongside the factory baseline;
                // an approved pattern must not trip again.
                let d = if profile.fb_historical.is_empty() {
                    d_normal
                } else {
                    // Keep the twin bounded; it has no reset cycle of its own
                    // outside feedback mode.
                    if profile.fb_baseline.series_len()
                        > profile.fb_baseline_start.series_len() + 4 * w
                    {
                        enter_feedback(profile, w);
                    }
                    profile.fb_baseline.append(sample.ppmv);
                    let d_fb = deviation_pct(
                        profile.fb_baseline.last_profile_value(),
                        profile.fb_max_distance,
                    );
                    match (d_normal, d_fb) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    }
                };

                match d {
                    Some(d) => classify(d, warning, alert),
                    None => Deviation::Undefined,
                }
            }
        };

        (deviation, mode)
    }
}

/// Deviation as percent of the seed baseline's max profile value.
fn deviation_pct(last_profile_value: Option<f64>, max_distance: f64) -> Option<f64> {
    last_profile_value.map(|v| v / max_distance.max(MAX_DISTANCE_FLOOR) * 100.0)
}

/// OFF→ON: reseed the live feedback baseline and replay recent context.
fn enter_feedback(profile: &mut SensorProfile, w: usize) {
    profile.fb_baseline = profile.fb_baseline_start.clone();
    let skip = profile.last_values.len().saturating_sub(w);
    let tail: Vec<f64> = profile.last_values.iter().skip(skip).copied().collect();
    profile.fb_baseline.extend(&tail);
}

/// ON→OFF: absorb the session into the feedback seed when the operator's
/// excursion stayed below the save limit.
fn finalize_feedback(profile: &mut SensorProfile, save_limit: f64) {
    if profile.fb_temp.is_empty() {
        return;
    }
    let session_max = profile.fb_temp.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if session_max < save_limit {
        profile.fb_historical.extend_from_slice(&profile.fb_temp);
        let absorbed: Vec<f64> = profile.fb_temp.clone();
        profile.fb_baseline_start.extend(&absorbed);
        profile.fb_max_distance = profile.fb_baseline_start.max_profile_value();
        debug!(
            absorbed = absorbed.len(),
            fb_max_distance = profile.fb_max_distance,
            "Absorbed operator-approved excursion into feedback baseline"
        );
    } else {
        debug!(
            session_max,
            save_limit, "Feedback session exceeds save limit; discarded"
        );
    }
    profile.fb_temp.clear();
}

/// Normal-mode update: reset at the 2W boundary, then append.
fn update_normal(profile: &mut SensorProfile, w: usize, value: f64) {
    if profile.counter >= 2 * w {
        profile.baseline = profile.initial_copy();
        profile.counter = w;
        while profile.last_values.len() > w {
            profile.last_values.pop_front();
        }
        let replay: Vec<f64> = profile.last_values.iter().copied().collect();
        profile.baseline.extend(&replay);
    }
    profile.baseline.append(value);
    profile.last_values.push_back(value);
    profile.counter += 1;
}

/// Feedback-mode update: identical procedure on the feedback twin; the
/// session buffer additionally records every observed value.
fn update_feedback(profile: &mut SensorProfile, w: usize, value: f64) {
    if profile.counter >= 2 * w {
        profile.fb_baseline = profile.fb_baseline_start.clone();
        profile.counter = w;
        while profile.last_values.len() > w {
            profile.last_values.pop_front();
        }
        let replay: Vec<f64> = profile.last_values.iter().copied().collect();
        profile.fb_baseline.extend(&replay);
    }
    profile.fb_baseline.append(value);
    profile.last_values.push_back(value);
    profile.counter += 1;
    profile.fb_temp.push(value);
}

// ============================================================================
// Tests
// ============================================================================

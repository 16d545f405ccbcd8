//! Monitor configuration — all pipeline tunables as operator-settable TOML values.
//!
//! Every struct implements `Default` with the commissioning values, so the
//! system behaves identically when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a platform deployment.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$AEGIR_CONFIG` env var
/// 2. `./monitor_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Anomaly engine tunables
    #[serde(default)]
    pub anomaly_detection: AnomalyDetectionConfig,

    /// Plume simulation switches and physics parameters
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Correlator / estimator tunables
    #[serde(default)]
    pub estimation: EstimationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            anomaly_detection: AnomalyDetectionConfig::default(),
            simulation: SimulationConfig::default(),
            estimation: EstimationConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration with the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("AEGIR_CONFIG") {
            match Self::load_from_file(Path::new(&path)) {
                Ok(cfg) => {
                    info!(path = %path, "Loaded monitor config from AEGIR_CONFIG");
                    return cfg;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to load AEGIR_CONFIG, falling back");
                }
            }
        }

        let local = Path::new("monitor_config.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(cfg) => {
                    info!("Loaded monitor config from ./monitor_config.toml");
                    return cfg;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse ./monitor_config.toml, using defaults");
                }
            }
        }

        info!("Using built-in default monitor config");
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-check every tunable. Called on load; cheap enough for tests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ad = &self.anomaly_detection;
        if ad.window_size == 0 {
            return Err(ConfigError::Invalid(
                "anomaly_detection.window_size must be positive".into(),
            ));
        }
        if ad.warning < 0.0 || ad.alert < ad.warning {
            return Err(ConfigError::Invalid(format!(
                "thresholds must satisfy 0 <= warning ({}) <= alert ({})",
                ad.warning, ad.alert
            )));
        }
        if ad.interactive_feedback_save_max_limit <= 0.0 {
            return Err(ConfigError::Invalid(
                "anomaly_detection.interactive_feedback_save_max_limit must be positive".into(),
            ));
        }

        let est = &self.estimation;
        if !(0.0..=1.0).contains(&est.weight_dtw) {
            return Err(ConfigError::Invalid(format!(
                "estimation.weight_dtw must be in [0, 1], got {}",
                est.weight_dtw
            )));
        }
        if est.threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "estimation.threshold must be positive".into(),
            ));
        }
        if est.max_lag == 0 || est.max_lag_neighbors == 0 {
            return Err(ConfigError::Invalid(
                "estimation lag caps must be positive".into(),
            ));
        }
        if est.beta < 0.0 {
            return Err(ConfigError::Invalid(
                "estimation.beta must be non-negative".into(),
            ));
        }

        let p = &self.simulation.parameters;
        if p.uref <= 0.0 || p.tref <= 0.0 || p.cd <= 0.0 || p.depth <= 0.0 {
            return Err(ConfigError::Invalid(
                "simulation.parameters uref/tref/cd/depth must be positive".into(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Anomaly Detection
// ============================================================================

/// Tunables for the online matrix-profile anomaly engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDetectionConfig {
    /// Analysis window size W in samples (144 = one day at 10-minute cadence)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Warning threshold, percent of the seed baseline's max profile value
    #[serde(default = "default_warning")]
    pub warning: f64,

    /// Alert (CRITICAL) threshold, percent of the seed baseline's max profile value
    #[serde(default = "default_alert")]
    pub alert: f64,

    /// Samples between offline baseline-selection runs
    #[serde(default = "default_selection_limit")]
    pub baseline_selection_limit: usize,

    /// Excursions with a max concentration below this limit (ppmv) may be
    /// absorbed into the feedback baseline on feedback-mode exit
    #[serde(default = "default_feedback_save_limit")]
    pub interactive_feedback_save_max_limit: f64,
}

impl Default for AnomalyDetectionConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            warning: default_warning(),
            alert: default_alert(),
            baseline_selection_limit: default_selection_limit(),
            interactive_feedback_save_max_limit: default_feedback_save_limit(),
        }
    }
}

fn default_window_size() -> usize {
    144
}
fn default_warning() -> f64 {
    50.0
}
fn default_alert() -> f64 {
    100.0
}
fn default_selection_limit() -> usize {
    4320 // 30 days at 10-minute cadence
}
fn default_feedback_save_limit() -> f64 {
    250.0
}

// ============================================================================
// Simulation
// ============================================================================

/// Plume simulation switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Master switch: when off, CRITICAL anomalies skip simulation entirely
    #[serde(default = "default_true")]
    pub turn_on: bool,

    #[serde(default)]
    pub options: SimulationOptions,

    #[serde(default)]
    pub parameters: PlumeParameters,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            turn_on: true,
            options: SimulationOptions::default(),
            parameters: PlumeParameters::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOptions {
    /// Run the open-template regression path
    #[serde(default = "default_true")]
    pub run_open_template: bool,

    /// Apply the Grant–Madsen-style wave-enhanced drag correction
    #[serde(default = "default_true")]
    pub wave_current_interaction: bool,

    /// Sensor-response smoothing time constant (s) applied to hypothesis
    /// curves; 0 disables smoothing
    #[serde(default)]
    pub response_tau: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            run_open_template: true,
            wave_current_interaction: true,
            response_tau: 0.0,
        }
    }
}

/// Fixed constants of the open-template plume regression.
///
/// Calibrated against the commissioning release trials; not re-derived here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlumeParameters {
    /// Rise-height amplitude (m)
    #[serde(default = "default_a")]
    pub a: f64,
    /// Rise-height velocity exponent
    #[serde(default = "default_p")]
    pub p: f64,
    /// Rise-height time exponent
    #[serde(default = "default_q")]
    pub q: f64,
    /// Entrainment coefficient
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Von Karman constant
    #[serde(default = "default_kappa")]
    pub kappa: f64,
    /// Reference current speed (m/s)
    #[serde(default = "default_uref")]
    pub uref: f64,
    /// Reference travel time (s)
    #[serde(default = "default_tref")]
    pub tref: f64,
    /// Default bottom drag coefficient
    #[serde(default = "default_cd")]
    pub cd: f64,
    /// Water depth at the template (m)
    #[serde(default = "default_depth")]
    pub depth: f64,
}

impl Default for PlumeParameters {
    fn default() -> Self {
        Self {
            a: default_a(),
            p: default_p(),
            q: default_q(),
            alpha: default_alpha(),
            kappa: default_kappa(),
            uref: default_uref(),
            tref: default_tref(),
            cd: default_cd(),
            depth: default_depth(),
        }
    }
}

fn default_a() -> f64 {
    2.06
}
fn default_p() -> f64 {
    0.59
}
fn default_q() -> f64 {
    0.52
}
fn default_alpha() -> f64 {
    0.10
}
fn default_kappa() -> f64 {
    0.40
}
fn default_uref() -> f64 {
    0.30
}
fn default_tref() -> f64 {
    60.0
}
fn default_cd() -> f64 {
    0.0025
}
fn default_depth() -> f64 {
    90.0
}

// ============================================================================
// Estimation
// ============================================================================

/// Correlator / estimator tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Weight of the DTW z-score in the consensus combination, in [0, 1]
    #[serde(default = "default_weight_dtw")]
    pub weight_dtw: f64,

    /// Z-score threshold above which a hypothesis counts as extreme
    #[serde(default = "default_z_threshold")]
    pub threshold: f64,

    /// Cross-correlation lag cap against hypotheses (samples)
    #[serde(default = "default_max_lag")]
    pub max_lag: usize,

    /// Lag penalty coefficient
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// Tighter lag cap for neighbor-sensor cross-correlation (samples)
    #[serde(default = "default_max_lag_neighbors")]
    pub max_lag_neighbors: usize,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            weight_dtw: default_weight_dtw(),
            threshold: default_z_threshold(),
            max_lag: default_max_lag(),
            beta: default_beta(),
            max_lag_neighbors: default_max_lag_neighbors(),
        }
    }
}

fn default_weight_dtw() -> f64 {
    0.4
}
fn default_z_threshold() -> f64 {
    1.5
}
fn default_max_lag() -> usize {
    20
}
fn default_beta() -> f64 {
    0.05
}
fn default_max_lag_neighbors() -> usize {
    6
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Tests
// ============================================================================

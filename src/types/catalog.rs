//! Platform catalogue — templates, sensors, and pre-catalogued leak locations.
//!
//! Positions are expressed in the owning template's local frame (metres).
//! The leak catalogue order is significant: a zero-based row index is the
//! leakage index reported by the estimator.

use serde::{Deserialize, Serialize};

/// A point in a template's local coordinate frame (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A named platform holding a catalogue of templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    pub templates: Vec<Template>,
}

/// A subsea template (structure) hosting sensors and leak points.
///
/// `roof_height` distinguishes geometry: `None` means an open template,
/// `Some(_)` a closed one. Closed-template plume simulation is not
/// implemented; the simulation driver rejects anomalies from closed
/// templates with [`MonitorError::NotImplemented`](crate::MonitorError).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// Rotation of the template frame relative to north (radians)
    pub angle_from_north: f64,
    /// Roof height in metres; `Some` marks a closed template
    pub roof_height: Option<f64>,
    /// Name of the owning platform
    pub platform: String,
}

impl Template {
    pub fn is_closed(&self) -> bool {
        self.roof_height.is_some()
    }
}

/// Mutable per-sensor configuration.
///
/// `initial_baseline` is the opaque serialized matrix-profile state blob the
/// sensor was commissioned with. It is immutable for the life of the process
/// except through baseline-selection adoption, which replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Opaque serialized matrix-profile seed state
    pub initial_baseline: Vec<u8>,
    /// Whether the operator has this sensor in interactive feedback mode
    pub interactive_feedback_mode: bool,
}

/// A methane sensor mounted on a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    /// Sensor position in the template's local frame
    pub position: Position,
    /// Id of the hosting template
    pub template_id: String,
    pub config: SensorConfig,
}

/// A pre-catalogued candidate leak location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leak {
    pub name: String,
    /// Leak position in the template's local frame
    pub position: Position,
    /// Mass release rate (kg/s)
    pub rate: f64,
    /// Release duration (s)
    pub duration: f64,
}

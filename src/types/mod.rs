//! Core data model for the leak-detection pipeline.

mod catalog;
mod environment;
mod events;
mod sample;

pub use catalog::{Leak, Platform, Position, Sensor, SensorConfig, Template};
pub use environment::{Current, Wave};
pub use events::{
    Deviation, EstimationResult, EstimationSummary, SensorEvent, SensorEventType, SystemEvent,
    SystemSeverity, TemplateEvent,
};
pub use sample::Sample;

/// One simulated concentration curve for one catalogued leak.
///
/// Length always equals the reference window `W`; values are finite and
/// non-negative by construction of the plume models.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Name of the catalogued leak this curve belongs to
    pub leak_name: String,
    /// Simulated concentrations at the sensor (ppmv)
    pub concentrations: Vec<f64>,
}

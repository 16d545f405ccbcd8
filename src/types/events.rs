//! Classification and event vocabulary.
//!
//! Deviations come out of the anomaly engine every sample; sensor/template
//! events are the debounced externally-visible view; estimation summaries are
//! the final leak-localization verdicts.

use crate::types::Sample;
use serde::{Deserialize, Serialize};

// ============================================================================
// Deviation
// ============================================================================

/// Per-sample classification emitted by the anomaly engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deviation {
    /// Within normal variation of the baseline
    Ok,
    /// Elevated but below the alert threshold
    Warning,
    /// Above the alert threshold — triggers plume simulation
    Critical,
    /// Not enough history yet to classify
    Undefined,
}

impl std::fmt::Display for Deviation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Deviation::Ok => write!(f, "OK"),
            Deviation::Warning => write!(f, "WARNING"),
            Deviation::Critical => write!(f, "CRITICAL"),
            Deviation::Undefined => write!(f, "UNDEFINED"),
        }
    }
}

// ============================================================================
// Estimation
// ============================================================================

/// Outcome of leak-source estimation for one anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationResult {
    /// Exactly one catalogued leak stands out — confirmed source
    Confirmed,
    /// No leak hypothesis explains the measurement
    Absent,
    /// Neighbor sensors move together — regional event, not a catalogued leak
    ExternalCause,
    /// No conclusive evidence either way
    Undefined,
}

impl std::fmt::Display for EstimationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimationResult::Confirmed => write!(f, "CONFIRMED"),
            EstimationResult::Absent => write!(f, "ABSENT"),
            EstimationResult::ExternalCause => write!(f, "EXTERNAL_CAUSE"),
            EstimationResult::Undefined => write!(f, "UNDEFINED"),
        }
    }
}

/// Final verdict for one CRITICAL anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationSummary {
    pub result: EstimationResult,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Zero-based index into the leak catalogue, or -1 when no leak was singled out
    pub leakage_index: i64,
    pub sensor_id: String,
    /// The anomalous sample that triggered this estimation
    pub anomaly: Sample,
}

// ============================================================================
// Events
// ============================================================================

/// Debounced event type for a single sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorEventType {
    Critical,
    Ok,
    NotAvailable,
}

impl From<Deviation> for SensorEventType {
    fn from(d: Deviation) -> Self {
        match d {
            Deviation::Critical => SensorEventType::Critical,
            Deviation::Ok | Deviation::Warning => SensorEventType::Ok,
            Deviation::Undefined => SensorEventType::NotAvailable,
        }
    }
}

/// A debounced sensor-level event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub sensor_id: String,
    pub event_type: SensorEventType,
    pub deviation: Deviation,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A template-level event rolled up from its sensors' current event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEvent {
    pub template_id: String,
    pub event_type: SensorEventType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Severity of an untyped system-level message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemSeverity {
    AlertCritical,
    AlertSuccess,
    Info,
}

/// System-level message (baseline adopted, sensor online/offline, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub severity: SystemSeverity,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_to_event_type() {
        assert_eq!(
            SensorEventType::from(Deviation::Critical),
            SensorEventType::Critical
        );
        assert_eq!(SensorEventType::from(Deviation::Ok), SensorEventType::Ok);
        // Warnings stay below the externally visible alarm level
        assert_eq!(
            SensorEventType::from(Deviation::Warning),
            SensorEventType::Ok
        );
        assert_eq!(
            SensorEventType::from(Deviation::Undefined),
            SensorEventType::NotAvailable
        );
    }
}

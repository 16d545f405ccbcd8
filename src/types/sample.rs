//! Concentration samples — the unit of ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single methane concentration measurement from one sensor.
///
/// Timestamps are ISO-8601 UTC and monotonically non-decreasing per sensor.
/// `ppmv` is a finite, non-negative concentration in parts per million by
/// volume; sources are expected to enforce that at the boundary (see
/// [`Sample::is_valid`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Identifier of the originating sensor
    pub sensor_id: String,
    /// Acquisition timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Methane concentration (ppmv)
    pub ppmv: f64,
}

impl Sample {
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>, ppmv: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            ppmv,
        }
    }

    /// Boundary check: finite, non-negative concentration.
    pub fn is_valid(&self) -> bool {
        self.ppmv.is_finite() && self.ppmv >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_validity() {
        let ts = Utc::now();
        assert!(Sample::new("S1", ts, 2.0).is_valid());
        assert!(Sample::new("S1", ts, 0.0).is_valid());
        assert!(!Sample::new("S1", ts, -1.0).is_valid());
        assert!(!Sample::new("S1", ts, f64::NAN).is_valid());
        assert!(!Sample::new("S1", ts, f64::INFINITY).is_valid());
    }
}

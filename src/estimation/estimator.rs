//! Final verdict for a CRITICAL anomaly from the correlator output.

use tracing::info;

use crate::config::EstimationConfig;
use crate::types::{EstimationResult, EstimationSummary, Sample};

use super::correlator::CorrelatorOutput;

/// Neighbor correlation above which the excursion is a regional event.
const EXTERNAL_CAUSE_FLOOR: f64 = 0.9;

pub struct Estimator {
    cfg: EstimationConfig,
}

impl Estimator {
    pub fn new(cfg: EstimationConfig) -> Self {
        Self { cfg }
    }

    /// Pure decision over the correlator output; calling it twice on the
    /// same output yields the same summary.
    pub fn estimate(&self, anomaly: &Sample, scores: &CorrelatorOutput) -> EstimationSummary {
        let (result, confidence, leakage_index) = if scores.consensus {
            let k = scores.extreme_indices[0];
            let confidence = (scores.final_z[k] / (2.0 * self.cfg.threshold)).clamp(0.0, 1.0);
            (EstimationResult::Confirmed, confidence, k as i64)
        } else if scores.neighbor_mean.unwrap_or(0.0) > EXTERNAL_CAUSE_FLOOR {
            (EstimationResult::ExternalCause, 1.0, -1)
        } else {
            (
                EstimationResult::Undefined,
                self.range_confidence(scores),
                -1,
            )
        };

        info!(
            sensor = %anomaly.sensor_id,
            result = %result,
            confidence = format!("{confidence:.2}"),
            leakage_index,
            "estimation complete"
        );

        EstimationSummary {
            result,
            confidence,
            leakage_index,
            sensor_id: anomaly.sensor_id.clone(),
            anomaly: anomaly.clone(),
        }
    }

    /// Inconclusive-case confidence from the spread of correlation peaks:
    /// a wide spread means the hypotheses at least discriminate, a flat set
    /// means the verdict is pure noise. Capped at 0.5.
    fn range_confidence(&self, scores: &CorrelatorOutput) -> f64 {
        let values: Vec<f64> = scores.peaks.iter().map(|p| p.value).collect();
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_abs = values.iter().map(|v| v.abs()).fold(0.0_f64, f64::max);
        if !max.is_finite() || !min.is_finite() {
            return 0.0;
        }
        0.5 * ((max - min) / (max_abs + 1e-9)).clamp(0.0, 1.0)
    }
}

//! Cross-correlation + DTW consensus scoring of hypothesis curves.
//!
//! Scores every simulated hypothesis against the measured reference window
//! on two axes: lag-penalized normalized cross-correlation, and inverted
//! path-normalized FastDTW. Each axis is z-scored across the hypothesis set,
//! blended by `weight_dtw`, re-z-scored, and thresholded. Consensus holds
//! iff exactly one hypothesis stands out.

use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::EstimationConfig;
use crate::error::MonitorError;
use crate::types::Hypothesis;

use super::dtw;

/// Norm floor under which a hypothesis counts as degenerate (all-zero).
const NORM_EPS: f64 = 1e-6;
/// Correlation peak substituted for degenerate hypotheses.
///
/// Deliberately propagates through the z-scoring: an all-zero hypothesis
/// still occupies a slot in the peak distribution.
const DEGENERATE_PEAK: f64 = 0.1;

/// Per-hypothesis cross-correlation result.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationPeak {
    /// Lag (samples) at which the penalized correlation peaks
    pub lag: i64,
    /// Peak penalized correlation value
    pub value: f64,
}

/// Full correlator output handed to the estimator.
#[derive(Debug, Clone)]
pub struct CorrelatorOutput {
    pub peaks: Vec<CorrelationPeak>,
    pub corr_z: Vec<f64>,
    pub dtw_z: Vec<f64>,
    /// Re-z-scored blend of `corr_z` and `dtw_z`
    pub final_z: Vec<f64>,
    /// Hypothesis indices whose `final_z` exceeds the threshold
    pub extreme_indices: Vec<usize>,
    /// True iff exactly one extreme index
    pub consensus: bool,
    /// Mean of neighbor-window correlation peaks, when neighbors were given
    pub neighbor_mean: Option<f64>,
}

pub struct Correlator {
    cfg: EstimationConfig,
}

impl Correlator {
    pub fn new(cfg: EstimationConfig) -> Self {
        Self { cfg }
    }

    /// Score `hypotheses` against the measured `reference` window.
    ///
    /// `neighbors` are other sensors' recent windows on the same template;
    /// pass an empty slice when unavailable.
    pub fn correlate(
        &self,
        reference: &[f64],
        hypotheses: &[Hypothesis],
        neighbors: &[Vec<f64>],
    ) -> Result<CorrelatorOutput, MonitorError> {
        if hypotheses.is_empty() {
            return Err(MonitorError::Unprocessable(
                "no hypotheses to correlate".into(),
            ));
        }
        for h in hypotheses {
            if h.concentrations.len() != reference.len() {
                return Err(MonitorError::Unprocessable(format!(
                    "hypothesis {} length {} != reference length {}",
                    h.leak_name,
                    h.concentrations.len(),
                    reference.len()
                )));
            }
        }
        for (i, n) in neighbors.iter().enumerate() {
            if n.len() != reference.len() {
                return Err(MonitorError::Unprocessable(format!(
                    "neighbor window {} length {} != reference length {}",
                    i,
                    n.len(),
                    reference.len()
                )));
            }
        }

        let peaks: Vec<CorrelationPeak> = hypotheses
            .iter()
            .map(|h| {
                penalized_peak(
                    reference,
                    &h.concentrations,
                    self.cfg.max_lag as i64,
                    self.cfg.beta,
                )
            })
            .collect();

        let corr_z = zscores(&peaks.iter().map(|p| p.value).collect::<Vec<_>>());

        let dtw_scores: Vec<f64> = hypotheses
            .iter()
            .map(|h| {
                let d = dtw::normalized_distance(reference, &h.concentrations, dtw::DEFAULT_RADIUS);
                if d < 1e-12 {
                    1e12
                } else {
                    1.0 / d
                }
            })
            .collect();
        let dtw_z = zscores(&dtw_scores);

        let w = self.cfg.weight_dtw;
        let weighted: Vec<f64> = corr_z
            .iter()
            .zip(&dtw_z)
            .map(|(c, d)| (1.0 - w) * c + w * d)
            .collect();
        let final_z = zscores(&weighted);

        let extreme_indices: Vec<usize> = final_z
            .iter()
            .enumerate()
            .filter(|(_, z)| **z > self.cfg.threshold)
            .map(|(i, _)| i)
            .collect();
        let consensus = extreme_indices.len() == 1;

        let neighbor_mean = if neighbors.is_empty() {
            None
        } else {
            let peaks: Vec<f64> = neighbors
                .iter()
                .map(|n| {
                    penalized_peak(reference, n, self.cfg.max_lag_neighbors as i64, 0.0).value
                })
                .collect();
            Some(peaks.iter().sum::<f64>() / peaks.len() as f64)
        };

        debug!(
            hypotheses = hypotheses.len(),
            extremes = extreme_indices.len(),
            consensus,
            neighbor_mean = ?neighbor_mean,
            "correlation pass complete"
        );

        Ok(CorrelatorOutput {
            peaks,
            corr_z,
            dtw_z,
            final_z,
            extreme_indices,
            consensus,
            neighbor_mean,
        })
    }
}

/// Lag-penalized normalized cross-correlation peak within `±max_lag`.
fn penalized_peak(x: &[f64], y: &[f64], max_lag: i64, beta: f64) -> CorrelationPeak {
    let norm = (x.iter().map(|v| v * v).sum::<f64>() * y.iter().map(|v| v * v).sum::<f64>()).sqrt();
    if norm < NORM_EPS {
        return CorrelationPeak {
            lag: 0,
            value: DEGENERATE_PEAK,
        };
    }

    let n = x.len() as i64;
    let cap = max_lag.min(n - 1);
    let mut best = CorrelationPeak {
        lag: 0,
        value: f64::NEG_INFINITY,
    };
    for lag in -cap..=cap {
        // c(lag) = sum_i x[i] * y[i - lag]
        let mut acc = 0.0;
        for i in 0..n {
            let j = i - lag;
            if j >= 0 && j < n {
                acc += x[i as usize] * y[j as usize];
            }
        }
        let value = acc / norm / (1.0 + beta * lag.abs() as f64);
        if value > best.value {
            best = CorrelationPeak { lag, value };
        }
    }
    best
}

/// Sample-std z-scores; all zeros when the spread vanishes.
pub(crate) fn zscores(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        return vec![0.0; values.len()];
    }
    let mean = values.iter().cloned().mean();
    let sd = values.iter().cloned().std_dev();
    if !sd.is_finite() || sd < 1e-12 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / sd).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hyp(name: &str, c: Vec<f64>) -> Hypothesis {
        Hypothesis {
            leak_name: name.into(),
            concentrations: c,
        }
    }

    fn cfg() -> EstimationConfig {
        EstimationConfig::default()
    }

    fn pulse(offset: usize, len: usize) -> Vec<f64> {
        let mut v = vec![0.0; len];
        for i in 0..6 {
            if offset + i < len {
                v[offset + i] = 1.0 + i as f64 * 0.3;
            }
        }
        v
    }

    #[test]
    fn test_matching_hypothesis_is_sole_extreme() {
        let reference = pulse(20, 64);
        let hyps = vec![
            hyp("a", pulse(50, 64)),
            hyp("match", reference.clone()),
            hyp("c", pulse(55, 64)),
            hyp("d", pulse(58, 64)),
            hyp("e", pulse(60, 64)),
            hyp("f", pulse(45, 64)),
        ];
        let mut c = cfg();
        c.threshold = 1.5;
        let out = Correlator::new(c).correlate(&reference, &hyps, &[]).unwrap();
        assert_eq!(out.extreme_indices, vec![1]);
        assert!(out.consensus);
        assert_eq!(out.peaks[1].lag, 0);
        assert!((out.peaks[1].value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_invariance_of_peak_position() {
        let reference = pulse(20, 64);
        let scaled: Vec<f64> = reference.iter().map(|v| v * 7.5).collect();
        let p_orig = penalized_peak(&reference, &reference, 20, 0.05);
        let p_scaled = penalized_peak(&reference, &scaled, 20, 0.05);
        assert_eq!(p_orig.lag, p_scaled.lag);
        assert!((p_orig.value - p_scaled.value).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_hypothesis_sentinel() {
        let p = penalized_peak(&pulse(10, 32), &vec![0.0; 32], 20, 0.05);
        assert_eq!(p.lag, 0);
        assert_eq!(p.value, DEGENERATE_PEAK);
    }

    #[test]
    fn test_lag_penalty_prefers_small_lags() {
        // Same shape at lag 0 vs lag 8: penalty favors the unshifted one
        let reference = pulse(20, 64);
        let shifted = pulse(28, 64);
        let p0 = penalized_peak(&reference, &reference, 20, 0.05);
        let p8 = penalized_peak(&reference, &shifted, 20, 0.05);
        assert!(p0.value > p8.value);
    }

    #[test]
    fn test_two_extremes_break_consensus() {
        let reference = pulse(20, 64);
        let hyps = vec![
            hyp("m1", reference.clone()),
            hyp("m2", reference.clone()),
            hyp("c", pulse(55, 64)),
            hyp("d", pulse(58, 64)),
            hyp("e", pulse(60, 64)),
            hyp("f", pulse(50, 64)),
        ];
        let mut c = cfg();
        // Two equal winners among six cap the z-score near 1.29
        c.threshold = 1.0;
        let out = Correlator::new(c).correlate(&reference, &hyps, &[]).unwrap();
        assert_eq!(out.extreme_indices.len(), 2);
        assert!(!out.consensus);
    }

    #[test]
    fn test_neighbor_mean_of_identical_windows() {
        let reference = pulse(20, 64);
        let neighbors = vec![reference.clone(); 4];
        let hyps = vec![
            hyp("a", pulse(50, 64)),
            hyp("b", pulse(55, 64)),
            hyp("c", pulse(58, 64)),
        ];
        let out = Correlator::new(cfg())
            .correlate(&reference, &hyps, &neighbors)
            .unwrap();
        let nm = out.neighbor_mean.unwrap();
        assert!((nm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_neighbor_window_rejected() {
        let reference = pulse(10, 64);
        let hyps = vec![hyp("a", pulse(30, 64)), hyp("b", pulse(40, 64))];
        let neighbors = vec![vec![1.0; 10]];
        let err = Correlator::new(cfg())
            .correlate(&reference, &hyps, &neighbors)
            .unwrap_err();
        assert!(matches!(err, MonitorError::Unprocessable(_)));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let reference = pulse(10, 64);
        let hyps = vec![hyp("short", vec![0.0; 32])];
        let err = Correlator::new(cfg())
            .correlate(&reference, &hyps, &[])
            .unwrap_err();
        assert!(matches!(err, MonitorError::Unprocessable(_)));
    }
}

//! Legacy three-metric scoring policy.
//!
//! Before the lag-penalized cross-correlation path became canonical, the
//! estimator ranked hypotheses by mutual information, matrix-profile
//! distance, and DTW, and confirmed a leak when at least two of the three
//! metrics singled out the same hypothesis. Retained behind
//! [`MetricPolicy::LegacyTriple`] for replaying historical verdicts; output
//! shape matches the canonical correlator.

use tracing::debug;

use crate::config::EstimationConfig;
use crate::error::MonitorError;
use crate::matrix_profile::mpdist;
use crate::types::Hypothesis;

use super::correlator::{zscores, CorrelationPeak, Correlator, CorrelatorOutput};
use super::dtw;

/// Histogram resolution for the mutual-information estimate.
const MI_BINS: usize = 8;
/// Subsequence length for MPDist, as a fraction of the window.
const MPDIST_WINDOW_DIV: usize = 4;

/// Which scoring path the estimator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricPolicy {
    /// Lag-penalized cross-correlation + DTW consensus (canonical)
    Canonical,
    /// Mutual information + MPDist + DTW, consensus-of-two
    LegacyTriple,
}

/// Score hypotheses under the selected policy.
pub fn correlate_with_policy(
    policy: MetricPolicy,
    cfg: &EstimationConfig,
    reference: &[f64],
    hypotheses: &[Hypothesis],
    neighbors: &[Vec<f64>],
) -> Result<CorrelatorOutput, MonitorError> {
    match policy {
        MetricPolicy::Canonical => {
            Correlator::new(cfg.clone()).correlate(reference, hypotheses, neighbors)
        }
        MetricPolicy::LegacyTriple => legacy_triple(cfg, reference, hypotheses),
    }
}

fn legacy_triple(
    cfg: &EstimationConfig,
    reference: &[f64],
    hypotheses: &[Hypothesis],
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

    let mp_w = (reference.len() / MPDIST_WINDOW_DIV).max(4);

    let mi: Vec<f64> = hypotheses
        .iter()
        .map(|h| mutual_information(reference, &h.concentrations))
        .collect();
    let mp: Vec<f64> = hypotheses
        .iter()
        .map(|h| invert(mpdist(reference, &h.concentrations, mp_w)))
        .collect();
    let dt: Vec<f64> = hypotheses
        .iter()
        .map(|h| invert(dtw::normalized_distance(reference, &h.concentrations, dtw::DEFAULT_RADIUS)))
        .collect();

    let metric_z = [zscores(&mi), zscores(&mp), zscores(&dt)];

    // A hypothesis is confirmed when at least two metrics mark it extreme
    let n = hypotheses.len();
    let mut votes = vec![0usize; n];
    for z in &metric_z {
        for (i, v) in z.iter().enumerate() {
            if *v > cfg.threshold {
                votes[i] += 1;
            }
        }
    }
    let extreme_indices: Vec<usize> = votes
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= 2)
        .map(|(i, _)| i)
        .collect();
    let consensus = extreme_indices.len() == 1;

    let combined: Vec<f64> = (0..n)
        .map(|i| metric_z.iter().map(|z| z[i]).sum::<f64>() / 3.0)
        .collect();
    let final_z = zscores(&combined);

    debug!(
        hypotheses = n,
        extremes = extreme_indices.len(),
        consensus,
        "legacy triple scoring complete"
    );

    Ok(CorrelatorOutput {
        // Legacy metrics have no lag notion; surface the MI values as peaks
        peaks: mi
            .iter()
            .map(|v| CorrelationPeak { lag: 0, value: *v })
            .collect(),
        corr_z: metric_z[0].clone(),
        dtw_z: metric_z[2].clone(),
        final_z,
        extreme_indices,
        consensus,
        neighbor_mean: None,
    })
}

fn invert(d: f64) -> f64 {
    if !d.is_finite() || d < 1e-12 {
        1e12
    } else {
        1.0 / d
    }
}

/// Histogram mutual information (nats) between two equal-length series.
fn mutual_information(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n == 0 {
        return 0.0;
    }
    let bx = bin_indices(x);
    let by = bin_indices(y);

    let mut joint = [[0.0_f64; MI_BINS]; MI_BINS];
    let mut px = [0.0_f64; MI_BINS];
    let mut py = [0.0_f64; MI_BINS];
    let weight = 1.0 / n as f64;
    for (&i, &j) in bx.iter().zip(&by) {
        joint[i][j] += weight;
        px[i] += weight;
        py[j] += weight;
    }

    let mut mi = 0.0;
    for i in 0..MI_BINS {
        for j in 0..MI_BINS {
            let p = joint[i][j];
            if p > 0.0 {
                mi += p * (p / (px[i] * py[j])).ln();
            }
        }
    }
    mi.max(0.0)
}

fn bin_indices(series: &[f64]) -> Vec<usize> {
    let min = series.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    series
        .iter()
        .map(|v| {
            if span < 1e-12 {
                0
            } else {
                (((v - min) / span * MI_BINS as f64) as usize).min(MI_BINS - 1)
            }
        })
        .collect()
}

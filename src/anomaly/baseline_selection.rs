//! Offline baseline selection.
//!
//! Runs periodically (every `baseline_selection_limit` samples) against a
//! sensor's accumulated history: cleans leak-like excursions out of the
//! history, replays the cleaned series through every candidate seed
//! baseline, and adopts the seed whose descriptive statistics best match the
//! cleaned data. A seed that still raises WARNING/CRITICAL on cleaned
//! (presumed leak-free) data is disqualified outright.

use tracing::{debug, info};

use crate::config::AnomalyDetectionConfig;
use crate::matrix_profile::{self, StreamingProfile};
use crate::types::Deviation;
use crate::MonitorError;

use super::engine::classify;
use super::store::decode_baseline;

/// Discords extracted per cleaning pass.
const TOP_K_DISCORDS: usize = 10;

/// MAD multiplier for the acceptance cut (1.4826 makes the MAD a consistent
/// sigma estimator for normal data).
const MAD_SIGMA: f64 = 1.4826;
const MAD_CUTOFF: f64 = 3.0;

/// A candidate seed baseline with its precomputed descriptive statistics.
#[derive(Debug, Clone)]
pub struct SeedBaseline {
    pub name: String,
    /// Opaque serialized matrix-profile state
    pub blob: Vec<u8>,
    /// Variance of the series the seed was built from
    pub variance: f64,
    /// Skewness of the series the seed was built from
    pub skew: f64,
    /// Normalization constant to score with
    pub max_distance: f64,
}

/// Outcome of one selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    /// Index into the seed bank of the adopted baseline
    pub seed_index: usize,
    /// Distance between cleaned-history stats and the seed's stats
    pub stats_distance: f64,
    /// Cleaned-history length that backed the decision
    pub cleaned_len: usize,
}

/// Pick the seed baseline best matching the sensor's cleaned history.
///
/// Returns `Ok(None)` when every seed is disqualified. Raises
/// [`MonitorError::NotEnoughHistory`] when fewer than `W` samples survive
/// cleaning; the caller skips this cycle.
pub fn select_baseline(
    history: &[f64],
    seeds: &[SeedBaseline],
    cfg: &AnomalyDetectionConfig,
) -> Result<Option<SelectionOutcome>, MonitorError> {
    let w = cfg.window_size;
    let cleaned = clean_history(history, w)?;

    let (variance, skew) = series_stats(&cleaned);
    debug!(
        history_len = history.len(),
        cleaned_len = cleaned.len(),
        variance,
        skew,
        "History cleaned for baseline selection"
    );

    let mut best: Option<SelectionOutcome> = None;
    for (idx, seed) in seeds.iter().enumerate() {
        let profile = match decode_baseline(&seed.blob) {
            Ok(p) => p,
            Err(e) => {
                debug!(seed = %seed.name, error = %e, "Skipping undecodable seed");
                continue;
            }
        };
        if !replays_clean(&profile, seed.max_distance, &cleaned, cfg) {
            debug!(seed = %seed.name, "Seed raises deviations on cleaned history; disqualified");
            continue;
        }

        let dv = variance - seed.variance;
        let ds = skew - seed.skew;
        let distance = (dv * dv + ds * ds).sqrt();
        match &best {
            Some(b) if b.stats_distance <= distance => {}
            _ => {
                best = Some(SelectionOutcome {
                    seed_index: idx,
                    stats_distance: distance,
                    cleaned_len: cleaned.len(),
                })
            }
        }
    }

    if let Some(ref b) = best {
        info!(
            seed = %seeds[b.seed_index].name,
            stats_distance = b.stats_distance,
            "Baseline selection picked a seed"
        );
    }
    Ok(best)
}

// ============================================================================
// History cleaning
// ============================================================================

/// Remove leak-like excursions from a history series.
///
/// Discords of the non-normalized matrix profile locate excursions in
/// absolute concentration; every discord above the MAD-derived acceptance
/// cut deletes the `W` samples preceding it plus the `2W` following it.
pub fn clean_history(history: &[f64], w: usize) -> Result<Vec<f64>, MonitorError> {
    if history.len() < w {
        return Err(MonitorError::NotEnoughHistory {
            have: history.len(),
            need: w,
        });
    }

    let profile = matrix_profile::compute_profile(history, w, false);
    let excl = matrix_profile::exclusion_zone(w);
    let discords = matrix_profile::find_discords(&profile, TOP_K_DISCORDS, excl);

    let cut = acceptance_cut(&profile);

    // Deletion ranges: [p - W, p + 2W) around each severe-enough discord.
    // Profiles of homogeneous data are numerically uninformative; an
    // absolute floor keeps float noise from deleting healthy segments.
    let mut ranges: Vec<(usize, usize)> = discords
        .iter()
        .filter(|d| d.distance > cut && d.distance > 1e-6)
        .map(|d| (d.index.saturating_sub(w), (d.index + 2 * w).min(history.len())))
        .collect();
    ranges.sort_unstable();

    let mut cleaned = Vec::with_capacity(history.len());
    let mut cursor = 0usize;
    for (lo, hi) in ranges {
        if lo > cursor {
            cleaned.extend_from_slice(&history[cursor..lo]);
        }
        cursor = cursor.max(hi);
    }
    if cursor < history.len() {
        cleaned.extend_from_slice(&history[cursor..]);
    }

    if cleaned.len() < w {
        return Err(MonitorError::NotEnoughHistory {
            have: cleaned.len(),
            need: w,
        });
    }
    Ok(cleaned)
}

/// Acceptance cut: max of the non-outlier profile values, where outliers are
/// values beyond 3 robust sigmas (MAD-based) of the median.
fn acceptance_cut(profile: &[f64]) -> f64 {
    let mut values: Vec<f64> = profile.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return f64::INFINITY;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = values[values.len() / 2];

    let mut deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
    deviations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mad = deviations[deviations.len() / 2];

    let cap = median + MAD_CUTOFF * MAD_SIGMA * mad;
    values
        .iter()
        .copied()
        .filter(|&v| v <= cap)
        .fold(f64::NEG_INFINITY, f64::max)
}

// ============================================================================
// Seed scoring
// ============================================================================

/// Replay the cleaned series through normal-mode classification with `seed`
/// standing in for the sensor's initial baseline. Any WARNING or CRITICAL
/// disqualifies the seed.
fn replays_clean(
    seed: &StreamingProfile,
    max_distance: f64,
    cleaned: &[f64],
    cfg: &AnomalyDetectionConfig,
) -> bool {
    let w = cfg.window_size;
    let mut baseline = seed.clone();
    let mut last_values: Vec<f64> = Vec::new();
    let mut counter = 0usize;

    for (i, &value) in cleaned.iter().enumerate() {
        if counter >= 2 * w {
            baseline = seed.clone();
            counter = w;
            let keep = last_values.len().saturating_sub(w);
            last_values.drain(..keep);
            baseline.extend(&last_values);
        }
        baseline.append(value);
        last_values.push(value);
        counter += 1;

        if i + 1 < w {
            continue;
        }
        if let Some(last) = baseline.last_profile_value() {
            let d = last / max_distance.max(1e-9) * 100.0;
            match classify(d, cfg.warning, cfg.alert) {
                Deviation::Warning | Deviation::Critical => return false,
                _ => {}
            }
        }
    }
    true
}

/// Population variance and moment skewness of a series.
pub fn series_stats(series: &[f64]) -> (f64, f64) {
    if series.is_empty() {
        return (0.0, 0.0);
    }
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let m2 = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let m3 = series.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;
    let skew = if m2 > 1e-12 { m3 / m2.powf(1.5) } else { 0.0 };
    (m2, skew)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::store::encode_baseline;

    const W: usize = 16;

    fn cfg() -> AnomalyDetectionConfig {
        AnomalyDetectionConfig {
            window_size: W,
            warning: 50.0,
            alert: 100.0,
            baseline_selection_limit: 1000,
            interactive_feedback_save_max_limit: 250.0,
        }
    }

    fn periodic(i: usize) -> f64 {
        2.0 + 0.5 * (i as f64 * std::f64::consts::TAU / W as f64).sin()
    }

    fn seed_from(series: &[f64], name: &str) -> SeedBaseline {
        let profile = StreamingProfile::from_series(series, W);
        let (variance, skew) = series_stats(series);
        SeedBaseline {
            name: name.into(),
            max_distance: profile.max_profile_value().max(1.0),
            blob: encode_baseline(&profile),
            variance,
            skew,
        }
    }

    #[test]
    fn test_not_enough_history() {
        let history = vec![2.0; W - 1];
        assert!(matches!(
            clean_history(&history, W),
            Err(MonitorError::NotEnoughHistory { .. })
        ));
    }

    #[test]
    fn test_cleaning_removes_excursion() {
        // Periodic background with a large excursion in the middle
        let mut history: Vec<f64> = (0..20 * W).map(periodic).collect();
        for v in &mut history[10 * W..10 * W + W] {
            *v += 80.0;
        }
        let cleaned = clean_history(&history, W).unwrap();
        assert!(cleaned.len() < history.len(), "nothing was removed");
        let max = cleaned.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(max < 50.0, "excursion survived cleaning: max {}", max);
    }

    #[test]
    fn test_uniform_history_survives_cleaning() {
        let history: Vec<f64> = (0..20 * W).map(periodic).collect();
        let cleaned = clean_history(&history, W).unwrap();
        // Homogeneous data may lose at most a couple of marginal segments
        assert!(cleaned.len() >= history.len() / 2);
    }

    #[test]
    fn test_own_baseline_never_strictly_worse() {
        let history: Vec<f64> = (0..20 * W).map(periodic).collect();

        // Seed bank: one built from this very history, one from a clearly
        // different regime.
        let own = seed_from(&history, "own");
        let other_series: Vec<f64> = (0..6 * W)
            .map(|i| 40.0 + 10.0 * (i as f64 * 0.9).sin())
            .collect();
        let other = seed_from(&other_series, "other");

        let outcome = select_baseline(&history, &[other, own], &cfg())
            .unwrap()
            .expect("no seed selected");
        assert_eq!(outcome.seed_index, 1, "own-history seed was beaten");
    }

    #[test]
    fn test_all_seeds_disqualified_gives_none() {
        let history: Vec<f64> = (0..20 * W).map(periodic).collect();
        // A flat seed with a tiny max_distance flags everything as CRITICAL
        let mut bad = seed_from(&vec![7.0; 3 * W], "bad");
        bad.max_distance = 1e-9;
        let outcome = select_baseline(&history, &[bad], &cfg()).unwrap();
        assert!(outcome.is_none());
    }
}

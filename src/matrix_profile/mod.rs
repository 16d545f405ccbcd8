//! Matrix profile computation — streaming and batch.
//!
//! The matrix profile of a series records, at each subsequence position, the
//! distance to its nearest non-trivial neighbor: low values mark repeated
//! patterns, high values mark discords. The anomaly engine keeps a
//! [`StreamingProfile`] per sensor and scores each new sample by the profile
//! value of the newest subsequence; baseline selection uses the batch
//! [`compute_profile`] over full histories.
//!
//! Distances are z-normalized Euclidean (shape-based) with a `W/2`
//! trivial-match exclusion zone. The batch path additionally offers a
//! non-normalized variant used for history cleaning, where absolute
//! concentration excursions matter.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Floor under standard deviations and norms; below this a subsequence is
/// treated as constant.
const STD_EPS: f64 = 1e-9;

// ============================================================================
// Subsequence distance
// ============================================================================

fn mean_std(w: &[f64]) -> (f64, f64) {
    let m = w.len() as f64;
    let mean = w.iter().sum::<f64>() / m;
    let var = w.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / m;
    (mean, var.sqrt())
}

/// Z-normalized Euclidean distance between two equal-length subsequences.
///
/// Two constant subsequences are identical in shape (distance 0); a constant
/// against a varying one is maximally uninformative and scores `sqrt(m)`.
pub fn znorm_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let m = a.len() as f64;
    let (ma, sa) = mean_std(a);
    let (mb, sb) = mean_std(b);

    if sa < STD_EPS && sb < STD_EPS {
        return 0.0;
    }
    if sa < STD_EPS || sb < STD_EPS {
        return m.sqrt();
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let r = (dot - m * ma * mb) / (m * sa * sb);
    // Numerical noise can push r marginally outside [-1, 1]
    let d2 = (2.0 * m * (1.0 - r)).max(0.0);
    d2.sqrt()
}

/// Plain (non-normalized) Euclidean distance between two subsequences.
pub fn euclid_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

// ============================================================================
// Batch profile
// ============================================================================

/// Compute the full matrix profile of `series` at window `w`.
///
/// Returns one entry per subsequence; entries with no valid neighbor (series
/// too short for the exclusion zone) are `f64::INFINITY`. Parallelized per
/// subsequence — histories run to tens of thousands of samples in the
/// offline baseline-selection path.
pub fn compute_profile(series: &[f64], w: usize, normalized: bool) -> Vec<f64> {
    if series.len() < w || w == 0 {
        return Vec::new();
    }
    let n_sub = series.len() - w + 1;
    let excl = exclusion_zone(w);

    (0..n_sub)
        .into_par_iter()
        .map(|i| {
            let a = &series[i..i + w];
            let mut best = f64::INFINITY;
            for j in 0..n_sub {
                if i.abs_diff(j) < excl {
                    continue;
                }
                let b = &series[j..j + w];
                let d = if normalized {
                    znorm_distance(a, b)
                } else {
                    euclid_distance(a, b)
                };
                if d < best {
                    best = d;
                }
            }
            best
        })
        .collect()
}

/// Trivial-match exclusion zone: half a window, at least one sample.
pub fn exclusion_zone(w: usize) -> usize {
    (w / 2).max(1)
}

// ============================================================================
// Discords
// ============================================================================

/// A discord — the subsequence index with a maximally distant nearest neighbor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discord {
    pub index: usize,
    pub distance: f64,
}

/// Extract up to `k` discords from a profile, masking an exclusion zone
/// around each find. Stops early when the remaining profile is
/// uninformative (no finite positive values left).
pub fn find_discords(profile: &[f64], k: usize, excl: usize) -> Vec<Discord> {
    let mut masked = profile.to_vec();
    let mut discords = Vec::with_capacity(k);

    for _ in 0..k {
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in masked.iter().enumerate() {
            if !v.is_finite() || v <= 0.0 {
                continue;
            }
            match best {
                Some((_, bv)) if v <= bv => {}
                _ => best = Some((i, v)),
            }
        }
        let Some((idx, dist)) = best else {
            break;
        };
        discords.push(Discord {
            index: idx,
            distance: dist,
        });
        let lo = idx.saturating_sub(excl);
        let hi = (idx + excl + 1).min(masked.len());
        for v in &mut masked[lo..hi] {
            *v = f64::NEG_INFINITY;
        }
    }

    discords
}

// ============================================================================
// MPDist (legacy estimator metric)
// ============================================================================

/// Matrix-profile distance between two series: the k-th smallest value of the
/// concatenated AB- and BA-join distance profiles (k = 5% of the combined
/// length). Small when the two series share any substantial subsequence.
pub fn mpdist(a: &[f64], b: &[f64], w: usize) -> f64 {
    if a.len() < w || b.len() < w || w == 0 {
        return f64::INFINITY;
    }
    let mut joined = Vec::new();
    joined.extend(join_profile(a, b, w));
    joined.extend(join_profile(b, a, w));
    if joined.is_empty() {
        return f64::INFINITY;
    }
    joined.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    let k = (((a.len() + b.len()) as f64 * 0.05).ceil() as usize).min(joined.len() - 1);
    joined[k]
}

/// AB-join: for every subsequence of `a`, distance to its nearest subsequence
/// of `b` (no exclusion zone — the series are distinct).
fn join_profile(a: &[f64], b: &[f64], w: usize) -> Vec<f64> {
    let na = a.len() - w + 1;
    let nb = b.len() - w + 1;
    (0..na)
        .map(|i| {
            let sa = &a[i..i + w];
            (0..nb)
                .map(|j| znorm_distance(sa, &b[j..j + w]))
                .fold(f64::INFINITY, f64::min)
        })
        .collect()
}

// ============================================================================
// Streaming profile
// ============================================================================

/// Online matrix profile over an append-only series.
///
/// Appending a sample creates one new subsequence; its distance profile
/// against all existing subsequences is computed, the minimum becomes its
/// profile entry, and earlier entries are relaxed where the new subsequence
/// is a closer neighbor (STAMPI update). The anomaly engine keeps the
/// backing series bounded by periodic reset, so the O(n·W) append stays
/// cheap.
///
/// Serializable: baseline seed blobs are exactly this state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingProfile {
    window: usize,
    series: Vec<f64>,
    profile: Vec<f64>,
}

impl StreamingProfile {
    /// Empty profile awaiting samples.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            series: Vec::new(),
            profile: Vec::new(),
        }
    }

    /// Batch-build from a seed series.
    pub fn from_series(series: &[f64], window: usize) -> Self {
        let profile = compute_profile(series, window, true);
        Self {
            window,
            series: series.to_vec(),
            profile,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn series_len(&self) -> usize {
        self.series.len()
    }

    /// Profile value of the newest subsequence, if one exists with a valid
    /// neighbor.
    pub fn last_profile_value(&self) -> Option<f64> {
        self.profile.last().copied().filter(|v| v.is_finite())
    }

    /// Maximum finite profile value; 0.0 for a degenerate profile.
    pub fn max_profile_value(&self) -> f64 {
        self.profile
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max)
    }

    /// Append one sample, updating the profile incrementally.
    pub fn append(&mut self, value: f64) {
        self.series.push(value);
        if self.series.len() < self.window {
            return;
        }

        let n_sub = self.series.len() - self.window + 1;
        let i_new = n_sub - 1;
        let excl = exclusion_zone(self.window);
        let new_sub: Vec<f64> = self.series[i_new..].to_vec();

        let mut best = f64::INFINITY;
        for j in 0..i_new {
            if i_new - j < excl {
                continue;
            }
            let d = znorm_distance(&new_sub, &self.series[j..j + self.window]);
            if d < best {
                best = d;
            }
            // The new subsequence may also be the closer neighbor of an old one
            if d < self.profile[j] {
                self.profile[j] = d;
            }
        }
        self.profile.push(best);
    }

    /// Replay a slice of values in order.
    pub fn extend(&mut self, values: &[f64]) {
        for &v in values {
            self.append(v);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

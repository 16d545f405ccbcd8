//! FastDTW — approximate dynamic time warping with banded refinement.
//!
//! Coarsen-recurse-refine: halve both series, align the halves, project the
//! coarse warp path back to full resolution widened by `radius`, and run the
//! exact dynamic program inside that band. Short inputs fall through to the
//! exact full-matrix solve. Distances are path-length normalized so series
//! pairs of different warp complexity stay comparable.

use std::collections::{HashMap, HashSet};

/// Default search radius for the banded refinement.
pub const DEFAULT_RADIUS: usize = 2;

/// Path-length-normalized FastDTW distance between two series.
pub fn normalized_distance(x: &[f64], y: &[f64], radius: usize) -> f64 {
    if x.is_empty() || y.is_empty() {
        return f64::INFINITY;
    }
    let (cost, path) = fastdtw(x, y, radius);
    cost / path.len() as f64
}

/// FastDTW returning total cost and the warp path.
pub fn fastdtw(x: &[f64], y: &[f64], radius: usize) -> (f64, Vec<(usize, usize)>) {
    let min_size = radius + 2;
    if x.len() <= min_size || y.len() <= min_size {
        return dtw_exact(x, y, None);
    }

    let shrunk_x = reduce_by_half(x);
    let shrunk_y = reduce_by_half(y);
    let (_, coarse_path) = fastdtw(&shrunk_x, &shrunk_y, radius);
    let window = expand_window(&coarse_path, x.len(), y.len(), radius);
    dtw_exact(x, y, Some(&window))
}

/// Exact dynamic program, optionally restricted to a cell window.
fn dtw_exact(
    x: &[f64],
    y: &[f64],
    window: Option<&HashSet<(usize, usize)>>,
) -> (f64, Vec<(usize, usize)>) {
    let mut cost: HashMap<(usize, usize), f64> = HashMap::new();
    cost.insert((0, 0), 0.0);

    let in_window = |i: usize, j: usize| -> bool {
        match window {
            Some(w) => w.contains(&(i, j)),
            None => true,
        }
    };

    for i in 1..=x.len() {
        for j in 1..=y.len() {
            if !in_window(i - 1, j - 1) {
                continue;
            }
            let d = (x[i - 1] - y[j - 1]).abs();
            let best = [
                cost.get(&(i - 1, j)),
                cost.get(&(i, j - 1)),
                cost.get(&(i - 1, j - 1)),
            ]
            .into_iter()
            .flatten()
            .cloned()
            .fold(f64::INFINITY, f64::min);
            if best.is_finite() {
                cost.insert((i, j), best + d);
            }
        }
    }

    // Backtrack the min-predecessor chain
    let mut path = Vec::new();
    let (mut i, mut j) = (x.len(), y.len());
    while i > 0 || j > 0 {
        path.push((i.saturating_sub(1), j.saturating_sub(1)));
        if i == 0 {
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let diag = cost.get(&(i - 1, j - 1)).cloned().unwrap_or(f64::INFINITY);
            let up = cost.get(&(i - 1, j)).cloned().unwrap_or(f64::INFINITY);
            let left = cost.get(&(i, j - 1)).cloned().unwrap_or(f64::INFINITY);
            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
    }
    path.reverse();

    let total = cost
        .get(&(x.len(), y.len()))
        .cloned()
        .unwrap_or(f64::INFINITY);
    (total, path)
}

/// Pairwise-average downsampling by 2; an odd tail keeps its own value.
fn reduce_by_half(series: &[f64]) -> Vec<f64> {
    series
        .chunks(2)
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect()
}

/// Project a coarse warp path onto the fine grid, widened by `radius`.
fn expand_window(
    coarse_path: &[(usize, usize)],
    len_x: usize,
    len_y: usize,
    radius: usize,
) -> HashSet<(usize, usize)> {
    let r = radius as isize;
    let mut window = HashSet::new();
    for &(ci, cj) in coarse_path {
        for di in -r..=r {
            for dj in -r..=r {
                let i = ci as isize + di;
                let j = cj as isize + dj;
                if i < 0 || j < 0 {
                    continue;
                }
                // Each coarse cell covers a 2x2 block at full resolution
                for (fi, fj) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    let x = 2 * i as usize + fi;
                    let y = 2 * j as usize + fj;
                    if x < len_x && y < len_y {
                        window.insert((x, y));
                    }
                }
            }
        }
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_series_zero() {
        let x: Vec<f64> = (0..64).map(|i| (i as f64 * 0.2).sin()).collect();
        assert!(normalized_distance(&x, &x, DEFAULT_RADIUS) < 1e-12);
    }

    #[test]
    fn test_symmetric() {
        let x: Vec<f64> = (0..48).map(|i| (i as f64 * 0.3).sin()).collect();
        let y: Vec<f64> = (0..48).map(|i| (i as f64 * 0.3).cos()).collect();
        let a = normalized_distance(&x, &y, DEFAULT_RADIUS);
        let b = normalized_distance(&y, &x, DEFAULT_RADIUS);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_warp_beats_pointwise() {
        // A shifted copy warps much closer than a flat line does
        let x: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
        let shifted: Vec<f64> = (0..64).map(|i| ((i + 2) as f64 * 0.3).sin()).collect();
        let flat = vec![0.0; 64];
        let d_shift = normalized_distance(&x, &shifted, DEFAULT_RADIUS);
        let d_flat = normalized_distance(&x, &flat, DEFAULT_RADIUS);
        assert!(d_shift < d_flat);
    }

    #[test]
    fn test_fastdtw_close_to_exact() {
        let x: Vec<f64> = (0..80).map(|i| (i as f64 * 0.17).sin() * 2.0).collect();
        let y: Vec<f64> = (0..80).map(|i| (i as f64 * 0.19).sin() * 2.0).collect();
        let (exact, exact_path) = dtw_exact(&x, &y, None);
        let approx = normalized_distance(&x, &y, DEFAULT_RADIUS);
        let exact_norm = exact / exact_path.len() as f64;
        // The banded approximation may only overestimate, and not by much
        assert!(approx >= exact_norm - 1e-9);
        assert!(approx <= exact_norm * 1.5 + 0.05);
    }

    #[test]
    fn test_empty_series_infinite() {
        assert!(normalized_distance(&[], &[1.0], DEFAULT_RADIUS).is_infinite());
    }
}

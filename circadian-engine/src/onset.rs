//! Activity onset detection.
//!
//! Each day is thresholded into a ±1 signal and correlated with a step-edge
//! kernel: negative weights before the edge, positive after. The onset is
//! the step where the signal best matches "inactive, then active".

use crate::stats::{argmax_last, percentile_higher};
use crate::time::duration_str;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Taper applied to each side of the onset kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelMode {
    /// Uniform weights
    Step,
    /// Linear decay away from the edge
    Linear,
    /// Square-root decay away from the edge
    Quadratic,
    /// Quarter-sine decay away from the edge
    Sine,
}

impl Default for KernelMode {
    fn default() -> Self {
        Self::Step
    }
}

impl KernelMode {
    /// Weight at distance `j` from the edge on a side of `len` samples
    #[inline]
    fn taper(self, j: usize, len: usize) -> f64 {
        let x = (len - j) as f64 / len as f64;
        match self {
            Self::Step => 1.0,
            Self::Linear => x,
            Self::Quadratic => x.sqrt(),
            Self::Sine => (FRAC_PI_2 * x).sin(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnsetParams {
    /// Percentile of a day's non-zero values that counts as active
    pub percentile: f64,
    /// Inactive span before the onset
    #[serde(with = "duration_str")]
    pub n: Duration,
    /// Active span after the onset
    #[serde(with = "duration_str")]
    pub m: Duration,
    pub kernel: KernelMode,
}

impl Default for OnsetParams {
    fn default() -> Self {
        Self {
            percentile: 20.0,
            n: Duration::hours(6),
            m: Duration::hours(6),
            kernel: KernelMode::Step,
        }
    }
}

/// Edge kernel of length `2 * max(n, m)` with the edge at index `max(n, m)`.
///
/// The shorter side is zero-padded at its far end.
pub fn onset_kernel(n: usize, m: usize, mode: KernelMode) -> Vec<f64> {
    let half = n.max(m);
    let mut kernel = vec![0.0; 2 * half];
    for j in 0..n {
        kernel[half - 1 - j] = -mode.taper(j, n);
    }
    for j in 0..m {
        kernel[half + j] = mode.taper(j, m);
    }
    kernel
}

/// Onset step within one day, or `None` for an empty day.
pub fn onset_step(day: &[f64], percentile: f64, kernel: &[f64]) -> Option<usize> {
    let spd = day.len();
    if spd == 0 {
        return None;
    }
    let nonzero: Vec<f64> = day.iter().copied().filter(|&v| v != 0.0).collect();
    let threshold = percentile_higher(&nonzero, percentile);

    // One day of inactivity on both sides
    let mut padded = vec![-1.0; 3 * spd];
    if let Some(threshold) = threshold {
        for (slot, &v) in padded[spd..2 * spd].iter_mut().zip(day.iter()) {
            if v >= threshold {
                *slot = 1.0;
            }
        }
    }

    let half = (kernel.len() / 2) as isize;
    let scores: Vec<f64> = (spd..2 * spd)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, &k)| {
                    let at = i as isize + j as isize - half;
                    (at >= 0 && (at as usize) < padded.len()).then(|| k * padded[at as usize])
                })
                .sum()
        })
        .collect();
    argmax_last(&scores)
}

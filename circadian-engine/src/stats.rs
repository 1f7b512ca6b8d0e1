//! Numeric primitives shared by the metrics.
//!
//! - Population mean / variance (two-pass, exact for constant input)
//! - First-occurrence argmax / argmin, last-occurrence argmax
//! - Sliding window means
//! - Percentiles with "higher" interpolation
//! - Quadrature over per-day metric curves (AUC)

use serde::{Deserialize, Serialize};

/// Arithmetic mean. `NaN` for an empty slice.
#[inline]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by `n`). `NaN` for an empty slice.
///
/// Two passes so that constant input yields exactly zero.
#[inline]
pub fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / values.len() as f64
}

/// Mean of squared successive differences. `NaN` for fewer than two values.
#[inline]
pub fn mean_squared_diff(values: &[f64]) -> f64 {
    let sum: f64 = values.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    sum / values.len().saturating_sub(1) as f64
}

/// Index of the first maximum.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the first minimum.
pub fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the last maximum (ties resolve toward the latest index).
pub fn argmax_last(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate().rev() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Means of every complete window of `width` consecutive values.
///
/// Each window is summed from scratch so equal windows compare equal and
/// the first-occurrence tie-breaking of [`argmax`] / [`argmin`] holds.
pub fn window_means(values: &[f64], width: usize) -> Vec<f64> {
    if width == 0 || width > values.len() {
        return Vec::new();
    }
    values
        .windows(width)
        .map(|w| w.iter().sum::<f64>() / width as f64)
        .collect()
}

/// Percentile (0..=100) using "higher" interpolation: the smallest sample at
/// or above the fractional rank. `None` for an empty slice.
pub fn percentile_higher(values: &[f64], percentile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (percentile / 100.0) * (sorted.len() - 1) as f64;
    let idx = (rank.ceil() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

/// Quadrature rule used to integrate a per-day metric curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AucMethod {
    /// Each day contributes its value over a unit cell
    Midpoint,
    /// Trapezoidal rule between day centres
    Trapezoid,
    /// Composite Simpson 1/3 rule between day centres
    Simpson,
}

impl Default for AucMethod {
    fn default() -> Self {
        Self::Trapezoid
    }
}

/// Area under a per-day curve sampled at day centres over `[0, days]`.
///
/// The half cells before the first and after the last centre use a linear
/// extrapolation through the two outermost samples.
pub fn integrate_daily(values: &[f64], method: AucMethod) -> f64 {
    match values.len() {
        0 => return 0.0,
        1 => return values[0],
        _ => {}
    }
    match method {
        AucMethod::Midpoint => values.iter().sum(),
        AucMethod::Trapezoid => trapezoid(values) + edge_cells(values),
        AucMethod::Simpson => simpson(values) + edge_cells(values),
    }
}

fn edge_cells(values: &[f64]) -> f64 {
    let n = values.len();
    let left = values[0] - (values[1] - values[0]) / 2.0;
    let right = values[n - 1] + (values[n - 1] - values[n - 2]) / 2.0;
    0.25 * (left + values[0]) + 0.25 * (values[n - 1] + right)
}

fn trapezoid(values: &[f64]) -> f64 {
    values.windows(2).map(|w| 0.5 * (w[0] + w[1])).sum()
}

fn simpson(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return trapezoid(values);
    }
    if n % 2 == 0 {
        // Odd point count for Simpson, one trapezoid closes the tail
        return simpson(&values[..n - 1]) + 0.5 * (values[n - 2] + values[n - 1]);
    }
    let inner: f64 = values[1..n - 1]
        .iter()
        .enumerate()
        .map(|(i, &v)| if i % 2 == 0 { 4.0 * v } else { 2.0 * v })
        .sum();
    (values[0] + inner + values[n - 1]) / 3.0
}

//! Chronobiology statistics over masked, day-aligned series.
//!
//! Every function here takes values for the included days only, laid out as
//! `days × steps_per_day` in row-major order. Window lengths and periods are
//! given in steps; the analyzer converts durations before calling in.

use crate::bouts::true_runs;
use crate::stats::{argmax, argmin, integrate_daily, mean_squared_diff, variance, window_means, AucMethod};
use crate::time::duration_str;
use chrono::Duration;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// A per-day metric and its aggregate over all included days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub daily: Vec<f64>,
    pub total: f64,
}

impl DailyMetric {
    /// Area under the daily curve
    pub fn auc(&self, method: AucMethod) -> f64 {
        integrate_daily(&self.daily, method)
    }
}

/// Candidate periods and their chi-square power.
#[derive(Debug, Clone, PartialEq)]
pub struct Periodogram {
    pub periods: Vec<Duration>,
    pub powers: Vec<f64>,
}

impl Periodogram {
    /// Period with the highest power (first on ties). `None` when every power is `NaN`.
    pub fn peak(&self) -> Option<Duration> {
        let finite: Vec<f64> = self
            .powers
            .iter()
            .map(|&p| if p.is_nan() { f64::NEG_INFINITY } else { p })
            .collect();
        if finite.iter().all(|p| *p == f64::NEG_INFINITY) {
            return None;
        }
        argmax(&finite).map(|i| self.periods[i])
    }
}

/// Bout count and mean bout duration per included day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBouts {
    pub counts: Vec<usize>,
    /// Mean bout duration in the requested timescale
    pub mean_durations: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodogramParams {
    #[serde(with = "duration_str")]
    pub min_period: Duration,
    #[serde(with = "duration_str")]
    pub max_period: Duration,
}

impl Default for PeriodogramParams {
    fn default() -> Self {
        Self {
            min_period: Duration::hours(16),
            max_period: Duration::hours(32),
        }
    }
}

/// Window lengths for the M10 / L5 style amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeAmplitudeParams {
    #[serde(with = "duration_str")]
    pub most_active: Duration,
    #[serde(with = "duration_str")]
    pub least_active: Duration,
}

impl Default for RelativeAmplitudeParams {
    fn default() -> Self {
        Self {
            most_active: Duration::hours(10),
            least_active: Duration::hours(5),
        }
    }
}

/// Enright chi-square periodogram for periods `min_steps..=max_steps`.
///
/// The series is zero-padded by `max_steps - 1` so trailing values are not
/// lost when folding. Zero total variance is not guarded and yields `NaN`.
pub fn periodogram(values: &[f64], min_steps: usize, max_steps: usize) -> Vec<f64> {
    let mut padded = values.to_vec();
    padded.resize(values.len() + max_steps.saturating_sub(1), 0.0);
    let n = padded.len();

    (min_steps..=max_steps)
        .map(|p| {
            let k = n / p;
            if k == 0 {
                return f64::NAN;
            }
            let used = &padded[..k * p];
            let folded = DMatrix::from_row_slice(k, p, used);
            let profile: Vec<f64> = folded.row_mean().iter().copied().collect();
            (k * p) as f64 * variance(&profile) / variance(used)
        })
        .collect()
}

/// Between-day variance of the mean daily profile over total variance.
///
/// Returns 0 when the total variance is zero or undefined.
pub fn interdaily_stability(values: &[f64], steps_per_day: usize) -> f64 {
    let days = values.len() / steps_per_day.max(1);
    if days == 0 {
        return 0.0;
    }
    let total = variance(values);
    if total == 0.0 || total.is_nan() {
        return 0.0;
    }
    let matrix = DMatrix::from_row_slice(days, steps_per_day, &values[..days * steps_per_day]);
    let profile: Vec<f64> = matrix.row_mean().iter().copied().collect();
    variance(&profile) / total
}

/// Mean squared successive difference over variance, per day and overall.
pub fn intradaily_variability(values: &[f64], steps_per_day: usize) -> DailyMetric {
    let ratio = |series: &[f64]| {
        let var = variance(series);
        if var > 0.0 {
            mean_squared_diff(series) / var
        } else {
            0.0
        }
    };
    DailyMetric {
        daily: values.chunks(steps_per_day.max(1)).map(ratio).collect(),
        total: ratio(values),
    }
}

/// Mean of the best window of `width` inside `day[range]`.
fn best_window(day: &[f64], from: usize, to: usize, width: usize, highest: bool) -> Option<(usize, f64)> {
    let means = window_means(&day[from..to], width);
    let idx = if highest { argmax(&means) } else { argmin(&means) }?;
    Some((from + idx, means[idx]))
}

/// Most-active mean and least-active mean of one day, never overlapping.
fn active_extremes(day: &[f64], most: usize, least: usize) -> (f64, f64) {
    let spd = day.len();
    let Some((most_idx, most_val)) = best_window(day, 0, spd, most, true) else {
        return (0.0, 0.0);
    };

    let before = (most_idx >= least)
        .then(|| best_window(day, 0, most_idx, least, false))
        .flatten();
    let after = (most_idx + most + least <= spd)
        .then(|| best_window(day, most_idx + most, spd, least, false))
        .flatten();
    let least_val = match (before, after) {
        (Some((_, a)), Some((_, b))) => Some(a.min(b)),
        (Some((_, v)), None) | (None, Some((_, v))) => Some(v),
        (None, None) => None,
    };
    if let Some(least_val) = least_val {
        return (most_val, least_val);
    }

    // Least-active window first, then the most-active one around it
    let Some((least_idx, least_val)) = best_window(day, 0, spd, least, false) else {
        return (most_val, 0.0);
    };
    let before = (least_idx >= most)
        .then(|| best_window(day, 0, least_idx, most, true))
        .flatten();
    let after = (least_idx + least + most <= spd)
        .then(|| best_window(day, least_idx + least, spd, most, true))
        .flatten();
    let most_val = match (before, after) {
        (Some((_, a)), Some((_, b))) => a.max(b),
        (Some((_, v)), None) | (None, Some((_, v))) => v,
        (None, None) => most_val,
    };
    (most_val, least_val)
}

/// `(M - L) / (M + L)` from the most / least active window means.
pub fn relative_amplitude(values: &[f64], steps_per_day: usize, most: usize, least: usize) -> DailyMetric {
    let amplitude = |m: f64, l: f64| if m != 0.0 { (m - l) / (m + l) } else { 0.0 };

    let mut daily = Vec::new();
    let mut total_most = 0.0;
    let mut total_least = 0.0;
    for day in values.chunks(steps_per_day.max(1)) {
        let (m, l) = active_extremes(day, most, least);
        total_most += m;
        total_least += l;
        daily.push(amplitude(m, l));
    }

    DailyMetric {
        daily,
        total: amplitude(total_most, total_least),
    }
}

/// Fraction of activity falling in the light phase.
///
/// The total is a ratio of sums across days, not a mean of daily fractions.
pub fn light_activity(values: &[f64], night: &[bool], steps_per_day: usize) -> DailyMetric {
    let spd = steps_per_day.max(1);
    let mut daily = Vec::new();
    let mut night_sum = 0.0;
    let mut total_sum = 0.0;

    for (day, day_night) in values.chunks(spd).zip(night.chunks(spd)) {
        let total: f64 = day.iter().sum();
        let at_night: f64 = day
            .iter()
            .zip(day_night.iter())
            .filter(|(_, &n)| n)
            .map(|(&v, _)| v)
            .sum();
        night_sum += at_night;
        total_sum += total;
        daily.push(if total != 0.0 { 1.0 - at_night / total } else { 0.0 });
    }

    DailyMetric {
        daily,
        total: if total_sum != 0.0 {
            1.0 - night_sum / total_sum
        } else {
            0.0
        },
    }
}

/// Bout counts and mean durations per day of a masked bout array.
pub fn daily_bout_stats(bouts: &[bool], steps_per_day: usize, step: Duration, timescale: Duration) -> DailyBouts {
    let step_ms = step.num_milliseconds() as f64;
    let scale_ms = timescale.num_milliseconds() as f64;
    let mut counts = Vec::new();
    let mut mean_durations = Vec::new();

    for day in bouts.chunks(steps_per_day.max(1)) {
        let runs = true_runs(day).len();
        let active = day.iter().filter(|&&b| b).count();
        counts.push(runs);
        mean_durations.push(if runs > 0 {
            step_ms * active as f64 / runs as f64 / scale_ms
        } else {
            0.0
        });
    }

    DailyBouts {
        counts,
        mean_durations,
    }
}

//! Circadian cycle analyzer.
//!
//! Two-tier model:
//! - [`ObservedSeries`] is built once from the raw records: the grid, the
//!   per-step activity histogram, the resolved night flags and the
//!   per-step event counts. It never changes afterwards.
//! - [`AnalysisState`] holds the bout policy, the daily mask and the bout
//!   array. Mutating calls validate first, then replace these fields whole.
//!
//! All metrics read the masked views of the current state.

use crate::bouts::{compute_bouts, true_runs, BoutParams};
use crate::daynight::{DayNightResolution, NightPattern};
use crate::error::{CycleError, Result};
use crate::grid::{rebin, Grid, GridBuilder, GridLayout};
use crate::mask::DailyMask;
use crate::metrics::{self, DailyBouts, DailyMetric, Periodogram, PeriodogramParams, RelativeAmplitudeParams};
use crate::onset::{onset_kernel, onset_step, OnsetParams};
use crate::records::{ActivityRecords, Event};
use crate::time::{day, duration_str, instant, step_minutes, steps_in};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Base discretization step
    #[serde(with = "duration_str")]
    pub step: Duration,
    /// Inclusive lower bound on the analyzed range
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the analyzed range
    pub stop: Option<DateTime<Utc>>,
    pub description: String,
    pub bouts: BoutParams,
    /// Positive-weight events a day needs to be included
    pub min_data_points: usize,
    /// Shift the grid so days start at the inferred night→day boundary
    pub align_to_light_cycle: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            step: Duration::minutes(5),
            start: None,
            stop: None,
            description: String::new(),
            bouts: BoutParams::default(),
            min_data_points: 1,
            align_to_light_cycle: true,
        }
    }
}

impl AnalyzerConfig {
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, stop: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_bouts(mut self, bouts: BoutParams) -> Self {
        self.bouts = bouts;
        self
    }

    pub fn with_min_data_points(mut self, min_data_points: usize) -> Self {
        self.min_data_points = min_data_points;
        self
    }

    pub fn with_alignment(mut self, align_to_light_cycle: bool) -> Self {
        self.align_to_light_cycle = align_to_light_cycle;
        self
    }

    /// Check every parameter before any computation.
    pub fn validate(&self) -> Result<()> {
        step_minutes(self.step)?;
        self.bouts.validate(self.step)?;
        if let (Some(start), Some(stop)) = (self.start, self.stop) {
            if start >= stop {
                return Err(CycleError::NoData(format!(
                    "empty date range: start {} is not before stop {}",
                    start, stop
                )));
            }
        }
        Ok(())
    }
}

/// Immutable discretized observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedSeries {
    grid: Grid,
    activity: Vec<f64>,
    night: Vec<bool>,
    counts: Vec<u32>,
    resolution: DayNightResolution,
    shift: usize,
    aligned: bool,
}

/// Mutable parameters and the caches derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisState {
    bout_params: BoutParams,
    min_data_points: usize,
    mask: DailyMask,
    bouts: Vec<bool>,
}

/// Overview of an analyzer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSummary {
    pub description: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    #[serde(with = "duration_str")]
    pub step: Duration,
    pub steps_per_day: usize,
    pub total_days: usize,
    pub included_days: usize,
    /// Night→day boundary as a time of day
    #[serde(with = "duration_str")]
    pub night_boundary: Duration,
    pub night_patterns: usize,
    pub bout_steps: usize,
    pub total_activity: f64,
}

/// Discretized activity, day/night and bout analysis over whole days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleAnalyzer {
    observed: ObservedSeries,
    state: AnalysisState,
    description: String,
}

impl CycleAnalyzer {
    /// Discretize the records, resolve day/night and compute the initial mask and bouts.
    pub fn new(records: &ActivityRecords, config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;

        let layout = GridBuilder::new(config.step)
            .with_range(config.start, config.stop)
            .build(records)?;
        let events: Vec<Event> = records
            .events()
            .filter(|e| e.at_ms < layout.cutoff_ms)
            .collect();

        let resolution = DayNightResolution::resolve(&layout, &events);
        let shift = if config.align_to_light_cycle {
            resolution.offset_steps()
        } else {
            0
        };
        let shifted = GridLayout {
            grid: layout.grid.shifted(shift)?,
            cutoff_ms: layout.cutoff_ms,
        };
        let binned = shifted.bin(events.iter());
        let night = resolution.night_series(shift);
        let grid = shifted.grid;

        let mask = DailyMask::from_counts(&binned.counts, grid.steps_per_day(), config.min_data_points);
        let bouts = compute_bouts(&binned.activity, &config.bouts, grid.step())?;

        debug!(
            start = %grid.start(),
            days = grid.total_days(),
            shift_steps = shift,
            "analyzer constructed"
        );

        Ok(Self {
            observed: ObservedSeries {
                grid,
                activity: binned.activity,
                night,
                counts: binned.counts,
                resolution,
                shift,
                aligned: config.align_to_light_cycle,
            },
            state: AnalysisState {
                bout_params: config.bouts,
                min_data_points: config.min_data_points,
                mask,
                bouts,
            },
            description: config.description,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.observed.grid
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn bout_params(&self) -> &BoutParams {
        &self.state.bout_params
    }

    pub fn min_data_points(&self) -> usize {
        self.state.min_data_points
    }

    pub fn mask(&self) -> &DailyMask {
        &self.state.mask
    }

    /// Number of included days
    pub fn days(&self) -> usize {
        self.state.mask.included_days()
    }

    pub fn night_patterns(&self) -> &[NightPattern] {
        self.observed.resolution.patterns()
    }

    /// Inferred night→day boundary as a time of day
    pub fn night_offset(&self) -> Duration {
        self.observed.resolution.boundary()
    }

    /// Whether days start at the inferred night→day boundary
    pub fn is_aligned(&self) -> bool {
        self.observed.aligned
    }

    /// Steps the grid was moved later by alignment
    pub fn shift_steps(&self) -> usize {
        self.observed.shift
    }

    // --- mutation ---

    /// Recompute the daily mask with a new event threshold.
    pub fn filter_inactive(&mut self, min_data_points: usize) {
        self.state.mask = DailyMask::from_counts(
            &self.observed.counts,
            self.observed.grid.steps_per_day(),
            min_data_points,
        );
        self.state.min_data_points = min_data_points;
    }

    /// Bout array (all steps, before masking) under `params`, without persisting.
    pub fn compute_bouts(&self, params: &BoutParams) -> Result<Vec<bool>> {
        compute_bouts(&self.observed.activity, params, self.observed.grid.step())
    }

    /// Replace the current bout policy and bout array.
    pub fn update_bouts(&mut self, params: BoutParams) -> Result<()> {
        params.validate(self.observed.grid.step())?;
        let bouts = self.compute_bouts(&params)?;
        self.state.bout_params = params;
        self.state.bouts = bouts;
        debug!(bout_steps = self.state.bouts.iter().filter(|&&b| b).count(), "bouts updated");
        Ok(())
    }

    // --- masked views ---

    pub fn activity(&self) -> Vec<f64> {
        self.state.mask.view(&self.observed.activity)
    }

    pub fn night(&self) -> Vec<bool> {
        self.state.mask.view(&self.observed.night)
    }

    pub fn bouts(&self) -> Vec<bool> {
        self.state.mask.view(&self.state.bouts)
    }

    /// Start instant of every included step
    pub fn timestamps(&self) -> Result<Vec<DateTime<Utc>>> {
        let grid = &self.observed.grid;
        let starts = grid.bin_starts(grid.step_ms())?;
        Ok(self.state.mask.view(&starts))
    }

    /// Half-open ranges of consecutive included days
    pub fn day_indices(&self) -> Vec<Range<usize>> {
        self.state.mask.day_indices()
    }

    // --- discretization ---

    fn series(&self, use_bouts: bool) -> Vec<f64> {
        if use_bouts {
            self.state
                .bouts
                .iter()
                .map(|&b| if b { 1.0 } else { 0.0 })
                .collect()
        } else {
            self.observed.activity.clone()
        }
    }

    /// Resolve a step override into `(step, base steps per bin, bins per day)`.
    fn metric_step(&self, step: Option<Duration>) -> Result<(Duration, usize, usize)> {
        let base = self.observed.grid.step();
        let step = step.unwrap_or(base);
        let minutes = step_minutes(step)?;
        let factor = steps_in(step, base, "step")?;
        Ok((step, factor, (day().num_minutes() / minutes) as usize))
    }

    /// Re-bin a full-length per-step series at `step` and keep included days.
    pub fn rebin_series(&self, weights: &[f64], step: Option<Duration>) -> Result<(Vec<DateTime<Utc>>, Vec<f64>)> {
        let grid = &self.observed.grid;
        if weights.len() != grid.len() {
            return Err(CycleError::DimensionMismatch {
                expected: grid.len(),
                got: weights.len(),
            });
        }
        let (step, factor, _) = self.metric_step(step)?;
        let starts = grid.bin_starts(step.num_milliseconds())?;
        let values = rebin(weights, factor);
        Ok((self.state.mask.view(&starts), self.state.mask.view(&values)))
    }

    /// Activity (or bout occupancy) at `step`, restricted to included days.
    pub fn discretize(&self, step: Option<Duration>, use_bouts: bool) -> Result<(Vec<DateTime<Utc>>, Vec<f64>)> {
        self.rebin_series(&self.series(use_bouts), step)
    }

    /// Included steps with `start <= t < stop`.
    pub fn select_dates(
        &self,
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
        use_bouts: bool,
    ) -> Result<(Vec<DateTime<Utc>>, Vec<f64>)> {
        let (timestamps, values) = self.discretize(None, use_bouts)?;
        Ok(timestamps
            .into_iter()
            .zip(values)
            .filter(|(t, _)| start.map_or(true, |s| *t >= s) && stop.map_or(true, |s| *t < s))
            .unzip())
    }

    /// Double-plotted actogram rows: each included day followed by the next calendar day.
    pub fn actogram(&self, step: Option<Duration>, use_bouts: bool) -> Result<Vec<Vec<f64>>> {
        let (_, factor, spd) = self.metric_step(step)?;
        let values = rebin(&self.series(use_bouts), factor);
        let mask = &self.state.mask;
        let total_days = mask.total_days();

        Ok((0..total_days)
            .filter(|&d| mask.is_included(d))
            .map(|d| {
                let mut row = values[d * spd..(d + 1) * spd].to_vec();
                if d + 1 < total_days && mask.is_included(d + 1) {
                    row.extend_from_slice(&values[(d + 1) * spd..(d + 2) * spd]);
                } else {
                    row.resize(2 * spd, 0.0);
                }
                row
            })
            .collect())
    }

    // --- metrics ---

    pub fn periodogram(&self, step: Option<Duration>, params: &PeriodogramParams, use_bouts: bool) -> Result<Periodogram> {
        let (step, _, _) = self.metric_step(step)?;
        let min_steps = steps_in(params.min_period, step, "min_period")?;
        let max_steps = steps_in(params.max_period, step, "max_period")?;
        if min_steps == 0 || min_steps > max_steps {
            return Err(CycleError::invalid(
                "periods must satisfy 0 < min_period <= max_period",
            ));
        }

        let (_, values) = self.discretize(Some(step), use_bouts)?;
        let step_minutes = step.num_minutes();
        Ok(Periodogram {
            periods: (min_steps..=max_steps)
                .map(|p| Duration::minutes(step_minutes * p as i64))
                .collect(),
            powers: metrics::periodogram(&values, min_steps, max_steps),
        })
    }

    pub fn interdaily_stability(&self, step: Option<Duration>, use_bouts: bool) -> Result<f64> {
        let (_, _, spd) = self.metric_step(step)?;
        let (_, values) = self.discretize(step, use_bouts)?;
        Ok(metrics::interdaily_stability(&values, spd))
    }

    pub fn intradaily_variability(&self, step: Option<Duration>, use_bouts: bool) -> Result<DailyMetric> {
        let (_, _, spd) = self.metric_step(step)?;
        let (_, values) = self.discretize(step, use_bouts)?;
        Ok(metrics::intradaily_variability(&values, spd))
    }

    pub fn relative_amplitude(
        &self,
        step: Option<Duration>,
        params: &RelativeAmplitudeParams,
        use_bouts: bool,
    ) -> Result<DailyMetric> {
        let (step, _, spd) = self.metric_step(step)?;
        let most = steps_in(params.most_active, step, "most_active")?;
        let least = steps_in(params.least_active, step, "least_active")?;
        if most == 0 || least == 0 {
            return Err(CycleError::invalid("most_active and least_active must be positive"));
        }
        if most + least + most.min(least) > spd {
            return Err(CycleError::invalid(
                "most_active + least_active + min(most_active, least_active) must not exceed one day",
            ));
        }
        let (_, values) = self.discretize(Some(step), use_bouts)?;
        Ok(metrics::relative_amplitude(&values, spd, most, least))
    }

    /// Fraction of activity outside the night phase, per included day.
    pub fn light_activity(&self, use_bouts: bool) -> DailyMetric {
        let values = self.state.mask.view(&self.series(use_bouts));
        metrics::light_activity(&values, &self.night(), self.observed.grid.steps_per_day())
    }

    /// Onset instant of every included day.
    pub fn activity_onset(&self, step: Option<Duration>, params: &OnsetParams, use_bouts: bool) -> Result<Vec<DateTime<Utc>>> {
        let (step, _, spd) = self.metric_step(step)?;
        if !(0.0..=100.0).contains(&params.percentile) {
            return Err(CycleError::invalid(format!(
                "percentile must lie in [0, 100], got {}",
                params.percentile
            )));
        }
        let n = steps_in(params.n, step, "N")?;
        let m = steps_in(params.m, step, "M")?;
        if n + m == 0 {
            return Err(CycleError::invalid("onset kernel must not be empty"));
        }
        let kernel = onset_kernel(n, m, params.kernel);

        let (timestamps, values) = self.discretize(Some(step), use_bouts)?;
        values
            .chunks(spd)
            .enumerate()
            .filter_map(|(d, day)| onset_step(day, params.percentile, &kernel).map(|s| (d, s)))
            .map(|(d, s)| {
                timestamps
                    .get(d * spd + s)
                    .copied()
                    .ok_or_else(|| CycleError::NoData(format!("no timestamp for day {}", d)))
            })
            .collect()
    }

    /// Bout counts and mean durations per included day.
    ///
    /// `params` overrides the current bout policy for this call only.
    pub fn daily_bouts(&self, params: Option<&BoutParams>, timescale: Duration) -> Result<DailyBouts> {
        if timescale <= Duration::zero() {
            return Err(CycleError::invalid("timescale must be positive"));
        }
        let bouts = match params {
            Some(params) => self.compute_bouts(params)?,
            None => self.state.bouts.clone(),
        };
        let grid = &self.observed.grid;
        Ok(metrics::daily_bout_stats(
            &self.state.mask.view(&bouts),
            grid.steps_per_day(),
            grid.step(),
            timescale,
        ))
    }

    /// `(start, end)` of every current bout; runs never cross an excluded day.
    pub fn bout_intervals(&self) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let grid = &self.observed.grid;
        let step_mask = self.state.mask.step_mask(grid.steps_per_day());
        let flags: Vec<bool> = self
            .state
            .bouts
            .iter()
            .zip(step_mask.iter())
            .map(|(&b, &m)| b && m)
            .collect();

        let origin = grid.start().timestamp_millis();
        let step_ms = grid.step_ms();
        true_runs(&flags)
            .into_iter()
            .map(|run| {
                Ok((
                    instant(origin + run.start as i64 * step_ms)?,
                    instant(origin + run.end as i64 * step_ms)?,
                ))
            })
            .collect()
    }

    /// Lengths of the current bouts in units of `timescale`.
    pub fn bout_durations(&self, timescale: Duration) -> Result<Vec<f64>> {
        if timescale <= Duration::zero() {
            return Err(CycleError::invalid("timescale must be positive"));
        }
        let scale = timescale.num_milliseconds() as f64;
        Ok(self
            .bout_intervals()?
            .into_iter()
            .map(|(start, end)| (end - start).num_milliseconds() as f64 / scale)
            .collect())
    }

    // --- reporting ---

    pub fn summary(&self) -> AnalyzerSummary {
        let grid = &self.observed.grid;
        AnalyzerSummary {
            description: self.description.clone(),
            start: grid.start(),
            stop: grid.stop(),
            step: grid.step(),
            steps_per_day: grid.steps_per_day(),
            total_days: grid.total_days(),
            included_days: self.days(),
            night_boundary: self.night_offset(),
            night_patterns: self.night_patterns().len(),
            bout_steps: self.bouts().iter().filter(|&&b| b).count(),
            total_activity: self.activity().iter().sum(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CycleError::SerializationError(e.to_string()))
    }

    /// Restore an analyzer exported by [`CycleAnalyzer::to_json`].
    ///
    /// Rejects state whose series lengths disagree with the grid and mask.
    pub fn from_json(json: &str) -> Result<Self> {
        let analyzer: Self =
            serde_json::from_str(json).map_err(|e| CycleError::SerializationError(e.to_string()))?;
        analyzer.check_lengths()?;
        Ok(analyzer)
    }

    fn check_lengths(&self) -> Result<()> {
        let grid = &self.observed.grid;
        let expected = grid.len();
        let lengths = [
            ("mask", self.state.mask.total_days() * grid.steps_per_day()),
            ("activity", self.observed.activity.len()),
            ("night", self.observed.night.len()),
            ("counts", self.observed.counts.len()),
            ("bouts", self.state.bouts.len()),
        ];
        match lengths.iter().find(|(_, len)| *len != expected) {
            Some((name, len)) => Err(CycleError::SerializationError(format!(
                "{} covers {} steps, grid has {}",
                name, len, expected
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::KernelMode;
    use crate::stats::AucMethod;
    use chrono::TimeZone;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn ts(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, day, h, 0, 0).unwrap()
    }

    fn hourly() -> AnalyzerConfig {
        AnalyzerConfig::default()
            .with_step(Duration::hours(1))
            .with_bouts(BoutParams::new(Duration::hours(1), Duration::zero(), 1.0))
    }

    /// One event per hour over `days` days, skipping hours for which `skip` is true
    fn every_hour(days: u32, skip: impl Fn(u32, u32) -> bool) -> Vec<DateTime<Utc>> {
        (1..=days)
            .flat_map(|d| (0..24).map(move |h| (d, h)))
            .filter(|&(d, h)| !skip(d, h))
            .map(|(d, h)| ts(d, h))
            .collect()
    }

    /// Hourly events, lights on from 06:00 to 18:00
    fn light_cycle_records(days: u32) -> ActivityRecords {
        let timestamps = every_hour(days, |_, _| false);
        let night = timestamps.iter().map(|t| !(6..18).contains(&(t.timestamp() / 3600 % 24))).collect();
        ActivityRecords::new(timestamps).with_night(night).unwrap()
    }

    #[test]
    fn test_grid_invariants() {
        let records = ActivityRecords::new(every_hour(3, |_, _| false));
        for minutes in [5, 15, 60, 180] {
            let config = AnalyzerConfig::default()
                .with_step(Duration::minutes(minutes))
                .with_bouts(BoutParams::new(Duration::hours(3), Duration::zero(), 1.0));
            let analyzer = CycleAnalyzer::new(&records, config).unwrap();
            let grid = analyzer.grid();
            let span = grid.stop() - grid.start();
            assert_eq!(span.num_milliseconds() % day().num_milliseconds(), 0);
            assert_eq!(1440 % grid.step().num_minutes(), 0);
            assert_eq!(analyzer.observed.activity.len(), grid.steps_per_day() * grid.total_days());
            assert_eq!(analyzer.observed.night.len(), analyzer.observed.activity.len());
        }
    }

    #[test]
    fn test_invalid_construction() {
        let records = ActivityRecords::new(every_hour(1, |_, _| false));
        let err = CycleAnalyzer::new(&records, AnalyzerConfig::default().with_step(Duration::minutes(7))).unwrap_err();
        assert!(err.is_recoverable());

        let err = CycleAnalyzer::new(
            &records,
            AnalyzerConfig::default().with_range(Some(ts(5, 0)), None),
        )
        .unwrap_err();
        assert!(matches!(err, CycleError::NoData(_)));
    }

    #[test]
    fn test_bouts_split_by_gap() {
        // Four silent hours in the middle of day one
        let records = ActivityRecords::new(every_hour(2, |d, h| d == 1 && (10..14).contains(&h)));
        let mut analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        analyzer
            .update_bouts(BoutParams::new(Duration::hours(1), Duration::hours(2), 1.0))
            .unwrap();

        let daily = analyzer.daily_bouts(None, Duration::hours(1)).unwrap();
        assert_eq!(daily.counts, vec![2, 1]);
        assert_eq!(daily.mean_durations, vec![10.0, 24.0]);

        let bouts = analyzer.bouts();
        assert!(bouts[24..48].iter().all(|&b| b));
        assert!(!bouts[10..14].iter().any(|&b| b));

        let intervals = analyzer.bout_intervals().unwrap();
        assert_eq!(intervals, vec![(ts(1, 0), ts(1, 10)), (ts(1, 14), ts(3, 0))]);
        assert_eq!(analyzer.bout_durations(Duration::hours(1)).unwrap(), vec![10.0, 34.0]);
    }

    #[test]
    fn test_bout_override_is_not_persisted() {
        let records = ActivityRecords::new(every_hour(2, |d, h| d == 1 && (10..14).contains(&h)));
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();

        let wide = BoutParams::new(Duration::hours(5), Duration::zero(), 1.0);
        assert_eq!(analyzer.daily_bouts(Some(&wide), Duration::hours(1)).unwrap().counts, vec![1, 1]);
        assert_eq!(analyzer.bout_params(), &hourly().bouts);
    }

    #[test]
    fn test_update_bouts_validates_first() {
        let records = ActivityRecords::new(every_hour(1, |_, _| false));
        let mut analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        let before = analyzer.bouts();

        let bad = BoutParams::new(Duration::hours(1), Duration::zero(), 0.0);
        assert!(analyzer.update_bouts(bad).is_err());
        let bad = BoutParams::new(Duration::minutes(90), Duration::zero(), 1.0);
        assert!(analyzer.update_bouts(bad).is_err());

        assert_eq!(analyzer.bouts(), before);
        assert_eq!(analyzer.bout_params(), &hourly().bouts);
    }

    #[test]
    fn test_night_boundary_realigns_grid() {
        let analyzer = CycleAnalyzer::new(&light_cycle_records(3), hourly()).unwrap();

        assert_eq!(analyzer.night_offset(), Duration::hours(6));
        assert!(analyzer.is_aligned());
        assert_eq!(analyzer.grid().start(), ts(1, 6));
        assert_eq!(analyzer.grid().total_days(), 3);

        let night = analyzer.night();
        for d in 0..3 {
            assert!(night[d * 24..d * 24 + 12].iter().all(|&n| !n));
            assert!(night[d * 24 + 12..(d + 1) * 24].iter().all(|&n| n));
        }

        let unaligned = CycleAnalyzer::new(&light_cycle_records(3), hourly().with_alignment(false)).unwrap();
        assert_eq!(unaligned.grid().start(), ts(1, 0));
        assert_eq!(unaligned.night_offset(), Duration::hours(6));
        assert!(!unaligned.is_aligned());
    }

    #[test]
    fn test_alignment_with_midnight_boundary() {
        // Lights on at midnight: aligned, but the grid does not move
        let timestamps = every_hour(2, |_, _| false);
        let night = timestamps.iter().map(|t| t.timestamp() / 3600 % 24 >= 12).collect();
        let records = ActivityRecords::new(timestamps).with_night(night).unwrap();
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();

        assert_eq!(analyzer.night_offset(), Duration::zero());
        assert!(analyzer.is_aligned());
        assert_eq!(analyzer.shift_steps(), 0);
        assert_eq!(analyzer.grid().start(), ts(1, 0));
    }

    #[test]
    fn test_light_activity() {
        let analyzer = CycleAnalyzer::new(&light_cycle_records(3), hourly()).unwrap();
        let la = analyzer.light_activity(false);

        assert!(approx_eq(la.daily[0], 0.5, 1e-12));
        assert!(approx_eq(la.daily[1], 0.5, 1e-12));
        // last shifted day only holds data until midnight
        assert!(approx_eq(la.daily[2], 1.0 - 6.0 / 18.0, 1e-12));
        assert!(approx_eq(la.total, 1.0 - 30.0 / 66.0, 1e-12));
    }

    #[test]
    fn test_light_activity_of_bouts() {
        // Weight 2 in the light phase, 1 at night
        let timestamps = every_hour(3, |_, _| false);
        let light: Vec<bool> = timestamps.iter().map(|t| (6..18).contains(&(t.timestamp() / 3600 % 24))).collect();
        let weights = light.iter().map(|&l| if l { 2.0 } else { 1.0 }).collect();
        let night = light.iter().map(|&l| !l).collect();
        let records = ActivityRecords::new(timestamps)
            .with_weights(weights)
            .unwrap()
            .with_night(night)
            .unwrap();
        let mut analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        analyzer
            .update_bouts(BoutParams::new(Duration::hours(1), Duration::zero(), 2.0))
            .unwrap();

        let by_activity = analyzer.light_activity(false);
        assert!(approx_eq(by_activity.daily[0], 24.0 / 36.0, 1e-12));

        // Bouts only cover the light phase
        let by_bouts = analyzer.light_activity(true);
        assert_eq!(by_bouts.daily, vec![1.0, 1.0, 1.0]);
        assert_eq!(by_bouts.total, 1.0);
    }

    #[test]
    fn test_uniform_activity_has_zero_stability() {
        let records = ActivityRecords::new(every_hour(4, |_, _| false));
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        assert_eq!(analyzer.interdaily_stability(None, false).unwrap(), 0.0);
        assert_eq!(analyzer.intradaily_variability(None, false).unwrap().total, 0.0);
    }

    #[test]
    fn test_relative_amplitude_of_pulse() {
        let timestamps: Vec<DateTime<Utc>> = (8..18).map(|h| ts(1, h)).collect();
        let weights = vec![10.0; timestamps.len()];
        let records = ActivityRecords::new(timestamps).with_weights(weights).unwrap();
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();

        let ra = analyzer
            .relative_amplitude(None, &RelativeAmplitudeParams::default(), false)
            .unwrap();
        assert_eq!(ra.daily, vec![1.0]);
        assert_eq!(ra.total, 1.0);

        let too_long = RelativeAmplitudeParams {
            most_active: Duration::hours(12),
            least_active: Duration::hours(8),
        };
        assert!(analyzer.relative_amplitude(None, &too_long, false).is_err());
    }

    #[test]
    fn test_periodogram_peak() {
        let records = ActivityRecords::new(every_hour(10, |_, h| h >= 12));
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        let pgram = analyzer
            .periodogram(None, &PeriodogramParams::default(), false)
            .unwrap();

        assert_eq!(pgram.periods.first(), Some(&Duration::hours(16)));
        assert_eq!(pgram.periods.len(), 17);
        let peak = pgram.peak().unwrap();
        assert!((peak - Duration::hours(24)).num_minutes().abs() <= 60);

        let odd = PeriodogramParams {
            min_period: Duration::minutes(90),
            max_period: Duration::hours(32),
        };
        assert!(analyzer.periodogram(None, &odd, false).is_err());
    }

    #[test]
    fn test_periodogram_without_days_is_nan() {
        let records = ActivityRecords::new(every_hour(2, |_, _| false));
        let mut analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        analyzer.filter_inactive(1000);

        assert_eq!(analyzer.days(), 0);
        let pgram = analyzer
            .periodogram(None, &PeriodogramParams::default(), false)
            .unwrap();
        assert!(pgram.powers.iter().all(|p| p.is_nan()));
        assert_eq!(analyzer.interdaily_stability(None, false).unwrap(), 0.0);
    }

    #[test]
    fn test_mask_consistency() {
        // Day two holds a single event
        let records = ActivityRecords::new(every_hour(3, |d, h| d == 2 && h > 0));
        let mut analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        assert_eq!(analyzer.days(), 3);

        analyzer.filter_inactive(2);
        assert_eq!(analyzer.mask().days(), &[true, false, true]);
        assert_eq!(analyzer.days(), 2);
        assert_eq!(analyzer.timestamps().unwrap().len(), 2 * 24);
        assert_eq!(analyzer.activity().len(), 2 * 24);
        assert_eq!(analyzer.day_indices(), vec![0..1, 2..3]);
        assert_eq!(analyzer.timestamps().unwrap()[24], ts(3, 0));

        let rows = analyzer.actogram(Some(Duration::hours(2)), false).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 24);
        // day two is excluded so the right half of row one is empty
        assert!(rows[0][12..].iter().all(|&v| v == 0.0));
        assert_eq!(rows[0][0], 2.0);
    }

    #[test]
    fn test_discretize_step_override() {
        let records = ActivityRecords::new(every_hour(1, |_, _| false));
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();

        let (starts, values) = analyzer.discretize(Some(Duration::hours(6)), false).unwrap();
        assert_eq!(values, vec![6.0; 4]);
        assert_eq!(starts[1], ts(1, 6));

        assert!(analyzer.discretize(Some(Duration::minutes(30)), false).is_err());
        assert!(analyzer.discretize(Some(Duration::minutes(100)), false).is_err());
        assert!(matches!(
            analyzer.rebin_series(&[1.0; 3], None),
            Err(CycleError::DimensionMismatch { expected: 24, got: 3 })
        ));
    }

    #[test]
    fn test_select_dates() {
        let records = ActivityRecords::new(every_hour(2, |_, _| false));
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();

        let (times, values) = analyzer.select_dates(Some(ts(1, 22)), Some(ts(2, 2)), false).unwrap();
        assert_eq!(times, vec![ts(1, 22), ts(1, 23), ts(2, 0), ts(2, 1)]);
        assert_eq!(values, vec![1.0; 4]);
        assert_eq!(analyzer.select_dates(None, None, true).unwrap().0.len(), 48);
    }

    #[test]
    fn test_activity_onset() {
        let records = ActivityRecords::new(every_hour(3, |_, h| !(9..21).contains(&h)));
        let analyzer = CycleAnalyzer::new(&records, hourly()).unwrap();
        let onsets = analyzer.activity_onset(None, &OnsetParams::default(), false).unwrap();
        assert_eq!(onsets, vec![ts(1, 9), ts(2, 9), ts(3, 9)]);

        let bad = OnsetParams {
            percentile: 120.0,
            kernel: KernelMode::Linear,
            ..OnsetParams::default()
        };
        assert!(analyzer.activity_onset(None, &bad, false).is_err());
    }

    #[test]
    fn test_summary_and_json() {
        let config = hourly().with_description("cage 4");
        let analyzer = CycleAnalyzer::new(&light_cycle_records(2), config).unwrap();

        let summary = analyzer.summary();
        assert_eq!(summary.description, "cage 4");
        assert_eq!(summary.total_days, 2);
        assert_eq!(summary.night_boundary, Duration::hours(6));
        assert_eq!(summary.night_patterns, 1);

        let json = analyzer.to_json().unwrap();
        let restored = CycleAnalyzer::from_json(&json).unwrap();
        assert_eq!(restored.activity(), analyzer.activity());
        assert_eq!(restored.night(), analyzer.night());
        assert_eq!(restored.summary(), summary);
        assert!(CycleAnalyzer::from_json("{").is_err());

        // Truncated series must not restore
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["observed"]["activity"].as_array_mut().unwrap().pop();
        let err = CycleAnalyzer::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, CycleError::SerializationError(_)));

        let iv = analyzer.intradaily_variability(None, false).unwrap();
        assert!(iv.auc(AucMethod::Trapezoid).is_finite());
    }

    #[test]
    fn test_config_json() {
        let config = AnalyzerConfig::default()
            .with_step(Duration::minutes(15))
            .with_bouts(BoutParams::new(Duration::minutes(30), Duration::hours(1), 2.0));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"step\":\"15m\""));
        let back: AnalyzerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert!(back.validate().is_ok());
    }
}

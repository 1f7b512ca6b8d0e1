//! Uniform time grid and weighted histograms.
//!
//! The grid spans a whole number of days starting at `start`, cut into
//! fixed `step`s that evenly divide one day:
//!
//! ```text
//! start                                              stop
//!   |-- step --|-- step --| ... |-- step --|-- step --|
//!   <--------- steps_per_day × total_days ----------->
//! ```

use crate::error::{CycleError, Result};
use crate::records::{ActivityRecords, Event};
use crate::time::{floor_to_day, instant, step_minutes, DAY_MS, DAY_MINUTES, MINUTE_MS};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Discretization grid: half-open `[start, stop)` of whole days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    step_minutes: i64,
}

impl Grid {
    /// Build a grid of `total_days` days from `start`.
    pub fn new(start: DateTime<Utc>, total_days: usize, step: Duration) -> Result<Self> {
        let step_minutes = step_minutes(step)?;
        if total_days == 0 {
            return Err(CycleError::NoData("time range contains zero days".to_string()));
        }
        let stop = instant(start.timestamp_millis() + total_days as i64 * DAY_MS)?;
        Ok(Self {
            start,
            stop,
            step_minutes,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn stop(&self) -> DateTime<Utc> {
        self.stop
    }

    pub fn step(&self) -> Duration {
        Duration::minutes(self.step_minutes)
    }

    #[inline]
    pub fn step_ms(&self) -> i64 {
        self.step_minutes * MINUTE_MS
    }

    #[inline]
    pub fn steps_per_day(&self) -> usize {
        (DAY_MINUTES / self.step_minutes) as usize
    }

    #[inline]
    pub fn total_days(&self) -> usize {
        ((self.stop.timestamp_millis() - self.start.timestamp_millis()) / DAY_MS) as usize
    }

    /// Number of steps on the grid
    #[inline]
    pub fn len(&self) -> usize {
        self.steps_per_day() * self.total_days()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same grid moved later by `steps` steps (day count unchanged)
    pub fn shifted(&self, steps: usize) -> Result<Self> {
        let offset = steps as i64 * self.step_ms();
        Ok(Self {
            start: instant(self.start.timestamp_millis() + offset)?,
            stop: instant(self.stop.timestamp_millis() + offset)?,
            step_minutes: self.step_minutes,
        })
    }

    /// Step index holding `at_ms`, if it lies on the grid
    #[inline]
    pub(crate) fn index_of(&self, at_ms: i64) -> Option<usize> {
        let start = self.start.timestamp_millis();
        if at_ms < start || at_ms >= self.stop.timestamp_millis() {
            return None;
        }
        Some(((at_ms - start) / self.step_ms()) as usize)
    }

    /// Start instants of every bin of width `bin_ms` across the grid
    pub fn bin_starts(&self, bin_ms: i64) -> Result<Vec<DateTime<Utc>>> {
        let start = self.start.timestamp_millis();
        let bins = (self.stop.timestamp_millis() - start) / bin_ms;
        (0..bins).map(|i| instant(start + i * bin_ms)).collect()
    }
}

/// Weighted per-step histograms of the raw events.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binned {
    /// Summed weight per step
    pub activity: Vec<f64>,
    /// Events with positive weight per step
    pub counts: Vec<u32>,
}

/// Builds a [`Grid`] from raw records and an optional date range.
#[derive(Debug, Clone)]
pub struct GridBuilder {
    step: Duration,
    start: Option<DateTime<Utc>>,
    stop: Option<DateTime<Utc>>,
}

/// Grid plus the exclusive cutoff past which events are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub grid: Grid,
    pub cutoff_ms: i64,
}

impl GridBuilder {
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            start: None,
            stop: None,
        }
    }

    /// Restrict the analysis to `[start, stop)`
    pub fn with_range(mut self, start: Option<DateTime<Utc>>, stop: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    /// Infer the grid bounds.
    ///
    /// `start` floors the earliest event to its UTC day (or takes the later
    /// supplied start); `stop` is the end of the data (or the earlier supplied
    /// stop) rounded up to a whole number of days from `start`.
    pub fn build(&self, records: &ActivityRecords) -> Result<GridLayout> {
        step_minutes(self.step)?;

        let (first, last) = records
            .events()
            .fold(None, |acc: Option<(i64, i64)>, e| match acc {
                None => Some((e.at_ms, e.at_ms)),
                Some((lo, hi)) => Some((lo.min(e.at_ms), hi.max(e.at_ms))),
            })
            .ok_or_else(|| CycleError::NoData("no activity records".to_string()))?;

        let mut start_ms = floor_to_day(first);
        if let Some(start) = self.start {
            start_ms = start_ms.max(start.timestamp_millis());
        }
        let mut cutoff_ms = last + 1;
        if let Some(stop) = self.stop {
            cutoff_ms = cutoff_ms.min(stop.timestamp_millis());
        }
        if cutoff_ms <= start_ms {
            return Err(CycleError::NoData(
                "time range contains zero days".to_string(),
            ));
        }

        let total_days = ((cutoff_ms - start_ms) + DAY_MS - 1) / DAY_MS;
        let grid = Grid::new(instant(start_ms)?, total_days as usize, self.step)?;
        debug!(
            start = %grid.start(),
            stop = %grid.stop(),
            days = grid.total_days(),
            steps_per_day = grid.steps_per_day(),
            "grid built"
        );

        Ok(GridLayout { grid, cutoff_ms })
    }
}

impl GridLayout {
    /// Histogram the events onto the grid, skipping events at or past the cutoff.
    pub(crate) fn bin<'a>(&self, events: impl Iterator<Item = &'a Event>) -> Binned {
        let n = self.grid.len();
        let mut binned = Binned {
            activity: vec![0.0; n],
            counts: vec![0; n],
        };
        for event in events {
            if event.at_ms >= self.cutoff_ms {
                continue;
            }
            if let Some(i) = self.grid.index_of(event.at_ms) {
                binned.activity[i] += event.weight;
                if event.weight > 0.0 {
                    binned.counts[i] += 1;
                }
            }
        }
        binned
    }
}

/// Sum consecutive groups of `factor` values (coarser re-binning).
pub fn rebin(values: &[f64], factor: usize) -> Vec<f64> {
    if factor <= 1 {
        return values.to_vec();
    }
    values
        .chunks(factor)
        .map(|chunk| chunk.iter().sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, day, h, m, 0).unwrap()
    }

    #[test]
    fn test_inferred_bounds() {
        let records = ActivityRecords::new(vec![ts(2, 13, 0), ts(1, 5, 30), ts(3, 0, 0)]);
        let layout = GridBuilder::new(Duration::minutes(30)).build(&records).unwrap();
        let grid = &layout.grid;

        assert_eq!(grid.start(), ts(1, 0, 0));
        assert_eq!(grid.stop(), ts(4, 0, 0));
        assert_eq!(grid.total_days(), 3);
        assert_eq!(grid.steps_per_day(), 48);
        assert_eq!(grid.len(), 144);
    }

    #[test]
    fn test_supplied_range_is_clamped() {
        let records = ActivityRecords::new(vec![ts(1, 1, 0), ts(5, 1, 0)]);
        let layout = GridBuilder::new(Duration::hours(1))
            .with_range(Some(ts(2, 6, 0)), Some(ts(3, 18, 0)))
            .build(&records)
            .unwrap();

        assert_eq!(layout.grid.start(), ts(2, 6, 0));
        // 1.5 days of data round up to 2 whole days
        assert_eq!(layout.grid.stop(), ts(4, 6, 0));
        assert_eq!(layout.cutoff_ms, ts(3, 18, 0).timestamp_millis());

        let early = GridBuilder::new(Duration::hours(1))
            .with_range(Some(ts(1, 0, 0) - Duration::days(30)), None)
            .build(&records)
            .unwrap();
        assert_eq!(early.grid.start(), ts(1, 0, 0));
    }

    #[test]
    fn test_empty_range_is_no_data() {
        let records = ActivityRecords::new(vec![ts(1, 1, 0)]);
        let err = GridBuilder::new(Duration::hours(1))
            .with_range(Some(ts(2, 0, 0)), None)
            .build(&records)
            .unwrap_err();
        assert!(matches!(err, CycleError::NoData(_)));

        let err = GridBuilder::new(Duration::hours(1))
            .build(&ActivityRecords::new(vec![]))
            .unwrap_err();
        assert!(matches!(err, CycleError::NoData(_)));
    }

    #[test]
    fn test_invalid_step() {
        let records = ActivityRecords::new(vec![ts(1, 1, 0)]);
        let err = GridBuilder::new(Duration::minutes(7)).build(&records).unwrap_err();
        assert!(matches!(err, CycleError::InvalidParameter(_)));
    }

    #[test]
    fn test_weighted_histogram() {
        let records = ActivityRecords::new(vec![ts(1, 0, 10), ts(1, 0, 50), ts(1, 2, 0), ts(1, 2, 5)])
            .with_weights(vec![2.0, 1.5, 0.0, 3.0])
            .unwrap();
        let layout = GridBuilder::new(Duration::hours(1)).build(&records).unwrap();
        let events: Vec<Event> = records.events().collect();
        let binned = layout.bin(events.iter());

        assert_eq!(binned.activity.len(), 24);
        assert_eq!(binned.activity[0], 3.5);
        assert_eq!(binned.activity[1], 0.0);
        assert_eq!(binned.activity[2], 3.0);
        assert_eq!(binned.counts[0], 2);
        assert_eq!(binned.counts[2], 1);
    }

    #[test]
    fn test_rebin_and_bin_starts() {
        assert_eq!(rebin(&[1.0, 2.0, 3.0, 4.0], 2), vec![3.0, 7.0]);
        assert_eq!(rebin(&[1.0, 2.0], 1), vec![1.0, 2.0]);

        let grid = Grid::new(ts(1, 0, 0), 1, Duration::hours(6)).unwrap();
        let starts = grid.bin_starts(6 * 3_600_000).unwrap();
        assert_eq!(starts, vec![ts(1, 0, 0), ts(1, 6, 0), ts(1, 12, 0), ts(1, 18, 0)]);
        assert_eq!(grid.shifted(1).unwrap().start(), ts(1, 6, 0));
    }
}

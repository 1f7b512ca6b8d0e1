//! Raw activity records - the caller-supplied event stream.
//!
//! Each event carries a timestamp, a non-negative weight (activity count)
//! and a day/night label. Events need not be sorted or evenly spaced.

use crate::error::{CycleError, Result};
use crate::time::{parse_clock_time, DAY_MS, DAY_MINUTES, MINUTE_MS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parallel arrays of observed activity events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecords {
    timestamps: Vec<DateTime<Utc>>,
    weights: Vec<f64>,
    night: Vec<bool>,
}

impl ActivityRecords {
    /// Records with unit weights, every event labeled night.
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        let n = timestamps.len();
        Self {
            timestamps,
            weights: vec![1.0; n],
            night: vec![true; n],
        }
    }

    /// Attach per-event weights (must be finite and non-negative).
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != self.timestamps.len() {
            return Err(CycleError::DimensionMismatch {
                expected: self.timestamps.len(),
                got: weights.len(),
            });
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(CycleError::invalid(format!(
                "activity weights must be finite and non-negative, got {}",
                bad
            )));
        }
        self.weights = weights;
        Ok(self)
    }

    /// Attach per-event night labels.
    pub fn with_night(mut self, night: Vec<bool>) -> Result<Self> {
        if night.len() != self.timestamps.len() {
            return Err(CycleError::DimensionMismatch {
                expected: self.timestamps.len(),
                got: night.len(),
            });
        }
        self.night = night;
        Ok(self)
    }

    /// Label every event from a daily night schedule.
    pub fn with_schedule(mut self, schedule: &NightSchedule) -> Self {
        self.night = schedule.label(&self.timestamps);
        self
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn night(&self) -> &[bool] {
        &self.night
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Events as epoch milliseconds, in input order
    pub(crate) fn events(&self) -> impl Iterator<Item = Event> + '_ {
        self.timestamps
            .iter()
            .zip(self.weights.iter())
            .zip(self.night.iter())
            .map(|((t, &weight), &night)| Event {
                at_ms: t.timestamp_millis(),
                weight,
                night,
            })
    }
}

/// One raw event in engine units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Event {
    pub at_ms: i64,
    pub weight: f64,
    pub night: bool,
}

/// Daily night intervals given as clock times, e.g. `("18:00", "06:00")`.
///
/// Stored as non-overlapping `[start, end)` minute ranges within one day;
/// an interval whose end precedes its start wraps past midnight and is
/// split in two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightSchedule {
    intervals: Vec<(i64, i64)>,
}

impl NightSchedule {
    /// Build from `(start, end)` clock-time pairs in chronological order.
    ///
    /// Only the last pair may wrap past midnight. `"0"`/`"00:00"` as an end
    /// boundary means midnight at the end of the day.
    pub fn parse(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut intervals = Vec::with_capacity(pairs.len() + 1);
        let mut last_end = 0;

        for (i, (start, end)) in pairs.iter().enumerate() {
            let start = parse_clock_time(start)? % DAY_MINUTES;
            let mut end = parse_clock_time(end)?;
            if end == 0 {
                end = DAY_MINUTES;
            }
            if start < last_end {
                return Err(CycleError::invalid("overlapping night intervals"));
            }
            if end < start {
                if i + 1 != pairs.len() {
                    return Err(CycleError::invalid(
                        "only the last night interval may wrap past midnight",
                    ));
                }
                let first_start = intervals.first().map(|&(s, _)| s).unwrap_or(start);
                if end > first_start {
                    return Err(CycleError::invalid("overlapping night intervals"));
                }
                intervals.insert(0, (0, end));
                intervals.push((start, DAY_MINUTES));
                last_end = DAY_MINUTES;
            } else {
                intervals.push((start, end));
                last_end = end;
            }
        }

        intervals.retain(|&(s, e)| e > s);
        Ok(Self { intervals })
    }

    /// Night intervals as `[start, end)` minutes since midnight
    pub fn intervals(&self) -> &[(i64, i64)] {
        &self.intervals
    }

    /// Whether the UTC clock time of `t` falls inside a night interval
    pub fn is_night(&self, t: &DateTime<Utc>) -> bool {
        let minute = t.timestamp_millis().rem_euclid(DAY_MS) / MINUTE_MS;
        self.intervals
            .iter()
            .any(|&(start, end)| minute >= start && minute < end)
    }

    /// Night label for every timestamp
    pub fn label(&self, timestamps: &[DateTime<Utc>]) -> Vec<bool> {
        timestamps.iter().map(|t| self.is_night(t)).collect()
    }
}

impl Default for NightSchedule {
    fn default() -> Self {
        Self {
            intervals: vec![(0, 6 * 60), (18 * 60, DAY_MINUTES)],
        }
    }
}

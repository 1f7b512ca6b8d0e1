//! Per-day inclusion mask and masked views.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Which calendar days of the grid are exposed to metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMask {
    days: Vec<bool>,
}

impl DailyMask {
    /// Include a day when it holds at least `min_data_points` positive-weight events.
    pub fn from_counts(counts: &[u32], steps_per_day: usize, min_data_points: usize) -> Self {
        let days: Vec<bool> = counts
            .chunks(steps_per_day.max(1))
            .map(|day| day.iter().map(|&c| c as usize).sum::<usize>() >= min_data_points)
            .collect();
        let mask = Self { days };
        debug!(
            min_data_points,
            included = mask.included_days(),
            total = mask.total_days(),
            "daily mask rebuilt"
        );
        mask
    }

    pub fn days(&self) -> &[bool] {
        &self.days
    }

    pub fn total_days(&self) -> usize {
        self.days.len()
    }

    /// Number of included days
    pub fn included_days(&self) -> usize {
        self.days.iter().filter(|&&d| d).count()
    }

    pub fn is_included(&self, day: usize) -> bool {
        self.days.get(day).copied().unwrap_or(false)
    }

    /// Day mask broadcast to every step of each day
    pub fn step_mask(&self, steps_per_day: usize) -> Vec<bool> {
        self.days
            .iter()
            .flat_map(|&d| std::iter::repeat(d).take(steps_per_day))
            .collect()
    }

    /// Half-open ranges of consecutive included days
    pub fn day_indices(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut open: Option<usize> = None;
        for (d, &included) in self.days.iter().enumerate() {
            match (included, open) {
                (true, None) => open = Some(d),
                (false, Some(start)) => {
                    ranges.push(start..d);
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            ranges.push(start..self.days.len());
        }
        ranges
    }

    /// Keep the values of included days from a day-aligned series.
    ///
    /// The series may use any number of steps per day.
    pub fn view<T: Copy>(&self, series: &[T]) -> Vec<T> {
        if self.days.is_empty() {
            return Vec::new();
        }
        let per_day = series.len() / self.days.len();
        if per_day == 0 {
            return Vec::new();
        }
        series
            .chunks(per_day)
            .zip(self.days.iter())
            .filter(|(_, &included)| included)
            .flat_map(|(chunk, _)| chunk.iter().copied())
            .collect()
    }
}

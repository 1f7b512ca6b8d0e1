//! Bout segmentation.
//!
//! A bout is a run of active steps (`activity >= min_activity`) in which no
//! two consecutive active steps are more than `max_gap` apart, and whose
//! first-to-last span is at least `min_duration`.

use crate::error::{CycleError, Result};
use crate::time::{duration_str, steps_in};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Bout policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoutParams {
    /// Largest allowed gap between consecutive active steps
    #[serde(with = "duration_str")]
    pub max_gap: Duration,
    /// Shortest qualifying span from first to last active step
    #[serde(with = "duration_str")]
    pub min_duration: Duration,
    /// Activity threshold for a step to count as active
    pub min_activity: f64,
}

impl Default for BoutParams {
    fn default() -> Self {
        Self {
            max_gap: Duration::minutes(5),
            min_duration: Duration::zero(),
            min_activity: 1.0,
        }
    }
}

impl BoutParams {
    pub fn new(max_gap: Duration, min_duration: Duration, min_activity: f64) -> Self {
        Self {
            max_gap,
            min_duration,
            min_activity,
        }
    }

    /// Gap and duration expressed in steps.
    pub fn in_steps(&self, step: Duration) -> Result<(usize, usize)> {
        let gap = steps_in(self.max_gap, step, "max_gap")?;
        let duration = steps_in(self.min_duration, step, "min_duration")?;
        if self.min_activity.is_nan() {
            return Err(CycleError::invalid("min_activity must be a number"));
        }
        Ok((gap, duration))
    }

    /// Checks applied before parameters are persisted on an analyzer.
    pub fn validate(&self, step: Duration) -> Result<()> {
        self.in_steps(step)?;
        if self.min_activity <= 0.0 {
            return Err(CycleError::invalid(format!(
                "min_activity must be positive, got {}",
                self.min_activity
            )));
        }
        Ok(())
    }
}

/// Mark every step that belongs to a qualifying bout.
pub fn compute_bouts(activity: &[f64], params: &BoutParams, step: Duration) -> Result<Vec<bool>> {
    let (max_gap, min_duration) = params.in_steps(step)?;

    let mut bouts = vec![false; activity.len()];
    let mut run: Option<(usize, usize)> = None;
    let close = |run: (usize, usize), bouts: &mut [bool]| {
        let (first, last) = run;
        if last - first >= min_duration {
            bouts[first..=last].iter_mut().for_each(|b| *b = true);
        }
    };

    for (i, _) in activity
        .iter()
        .enumerate()
        .filter(|(_, &a)| a >= params.min_activity)
    {
        run = match run {
            Some((first, last)) if i - last <= max_gap => Some((first, i)),
            Some(done) => {
                close(done, &mut bouts);
                Some((i, i))
            }
            None => Some((i, i)),
        };
    }
    if let Some(done) = run {
        close(done, &mut bouts);
    }

    Ok(bouts)
}

/// Maximal runs of `true` steps as half-open index ranges.
pub fn true_runs(flags: &[bool]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut open: Option<usize> = None;
    for (i, &f) in flags.iter().enumerate() {
        match (f, open) {
            (true, None) => open = Some(i),
            (false, Some(start)) => {
                runs.push(start..i);
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        runs.push(start..flags.len());
    }
    runs
}

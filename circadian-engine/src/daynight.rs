//! Day/night boundary inference.
//!
//! Night labels arrive sparse and noisy: the apparent light-off/light-on
//! time drifts from day to day only because of uneven sampling. The
//! resolver merges consecutive compatible days into a few canonical 24h
//! patterns, fills the unlabeled steps (snapping boundaries to round clock
//! times), and picks one night→day boundary to re-anchor the grid on.
//!
//! Algorithm:
//! 1. Mark steps holding night-labeled / day-labeled events per day
//!    (night wins when both occur in one step)
//! 2. Walk days in order, OR-ing each day into the running pattern until a
//!    day contradicts it, then start a new pattern
//! 3. Fill unlabeled runs of each pattern from the neighbouring labels
//! 4. Vote for night→day transition steps, weighted by days per pattern

use crate::grid::GridLayout;
use crate::records::Event;
use crate::time::DAY_MINUTES;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Clock alignments tried for pattern boundaries, coarsest first (minutes)
pub const PRETTY_MINUTES: [i64; 5] = [60, 30, 15, 10, 5];

/// One canonical 24-hour night mask and the days that follow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightPattern {
    night: Vec<bool>,
    first_day: usize,
    days: usize,
}

impl NightPattern {
    /// Filled night mask over one day (`true` = night)
    pub fn night(&self) -> &[bool] {
        &self.night
    }

    /// First calendar day (grid index) using this pattern
    pub fn first_day(&self) -> usize {
        self.first_day
    }

    /// Number of consecutive days using this pattern
    pub fn days(&self) -> usize {
        self.days
    }

    pub fn night_steps(&self) -> usize {
        self.night.iter().filter(|&&n| n).count()
    }

    /// Steps where night turns into day (circular)
    pub fn dawns(&self) -> Vec<usize> {
        let spd = self.night.len();
        (0..spd)
            .filter(|&s| self.night[(s + spd - 1) % spd] && !self.night[s])
            .collect()
    }
}

/// Outcome of day/night resolution over the unshifted grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayNightResolution {
    patterns: Vec<NightPattern>,
    day_pattern: Vec<usize>,
    offset: usize,
    step_minutes: i64,
}

/// Running pattern while days are being merged.
struct Accumulator {
    night: Vec<bool>,
    day: Vec<bool>,
    first_day: usize,
    days: usize,
}

impl Accumulator {
    fn start(first_day: usize, night: &[bool], day: &[bool]) -> Self {
        Self {
            night: night.to_vec(),
            day: day.to_vec(),
            first_day,
            days: 1,
        }
    }

    fn conflicts(&self, night: &[bool], day: &[bool]) -> bool {
        (0..night.len()).any(|s| (self.day[s] && night[s]) || (self.night[s] && day[s]))
    }

    fn absorb(&mut self, night: &[bool], day: &[bool]) {
        for s in 0..night.len() {
            self.night[s] |= night[s];
            self.day[s] |= day[s];
        }
        self.days += 1;
    }

    fn finish(self, step_minutes: i64) -> NightPattern {
        let signed: Vec<i8> = self
            .night
            .iter()
            .zip(self.day.iter())
            .map(|(&n, &d)| match (n, d) {
                (true, _) => 1,
                (false, true) => -1,
                (false, false) => 0,
            })
            .collect();
        NightPattern {
            night: fill_pattern(&signed, step_minutes),
            first_day: self.first_day,
            days: self.days,
        }
    }
}

impl DayNightResolution {
    /// Infer night patterns and the canonical boundary from labeled events.
    pub(crate) fn resolve(layout: &GridLayout, events: &[Event]) -> Self {
        let grid = &layout.grid;
        let spd = grid.steps_per_day();
        let total_days = grid.total_days();
        let step_minutes = grid.step().num_minutes();

        let mut night_hits = vec![false; grid.len()];
        let mut day_hits = vec![false; grid.len()];
        for event in events.iter().filter(|e| e.at_ms < layout.cutoff_ms) {
            if let Some(i) = grid.index_of(event.at_ms) {
                if event.night {
                    night_hits[i] = true;
                } else {
                    day_hits[i] = true;
                }
            }
        }
        for (d, n) in day_hits.iter_mut().zip(night_hits.iter()) {
            if *n {
                *d = false;
            }
        }

        let mut finished: Vec<Accumulator> = Vec::new();
        let mut current: Option<Accumulator> = None;
        let mut day_pattern = Vec::with_capacity(total_days);

        for d in 0..total_days {
            let night = &night_hits[d * spd..(d + 1) * spd];
            let day = &day_hits[d * spd..(d + 1) * spd];

            let compatible = current
                .as_ref()
                .map_or(false, |acc| !acc.conflicts(night, day));
            if compatible {
                if let Some(acc) = current.as_mut() {
                    acc.absorb(night, day);
                }
            } else {
                if let Some(acc) = current.take() {
                    debug!(first_day = acc.first_day, days = acc.days, "night pattern closed");
                    finished.push(acc);
                }
                current = Some(Accumulator::start(d, night, day));
            }
            day_pattern.push(finished.len());
        }
        if let Some(acc) = current {
            finished.push(acc);
        }

        let patterns: Vec<NightPattern> = finished
            .into_iter()
            .map(|acc| acc.finish(step_minutes))
            .collect();
        let offset = choose_boundary(&patterns, spd);

        if patterns.iter().all(|p| p.dawns().is_empty()) {
            warn!("day/night labels are one-sided or absent; no night-to-day boundary found");
        }
        info!(
            patterns = patterns.len(),
            offset_steps = offset,
            "resolved day/night boundary"
        );

        Self {
            patterns,
            day_pattern,
            offset,
            step_minutes,
        }
    }

    pub fn patterns(&self) -> &[NightPattern] {
        &self.patterns
    }

    /// Pattern used by calendar day `day` of the unshifted grid
    pub fn pattern_for_day(&self, day: usize) -> Option<&NightPattern> {
        self.day_pattern.get(day).and_then(|&p| self.patterns.get(p))
    }

    /// Night→day boundary in steps from the start of the day
    pub fn offset_steps(&self) -> usize {
        self.offset
    }

    /// Night→day boundary as a time of day
    pub fn boundary(&self) -> Duration {
        Duration::minutes(self.offset as i64 * self.step_minutes)
    }

    /// Per-step night flags for a grid moved `shift` steps later.
    ///
    /// Steps past the last calendar day reuse the last day's pattern.
    pub fn night_series(&self, shift: usize) -> Vec<bool> {
        let total_days = self.day_pattern.len();
        let spd = (DAY_MINUTES / self.step_minutes) as usize;
        (0..total_days * spd)
            .map(|i| {
                let orig = i + shift;
                let day = (orig / spd).min(total_days.saturating_sub(1));
                self.pattern_for_day(day)
                    .map_or(true, |p| p.night[orig % spd])
            })
            .collect()
    }
}

/// Fill a signed one-day pattern (+1 night, -1 day, 0 unknown) into a night mask.
///
/// No day labels at all yields an all-night mask, no night labels an
/// all-day mask.
pub fn fill_pattern(signed: &[i8], step_minutes: i64) -> Vec<bool> {
    let spd = signed.len();
    let known: Vec<usize> = (0..spd).filter(|&s| signed[s] != 0).collect();
    let has_night = known.iter().any(|&s| signed[s] > 0);
    let has_day = known.iter().any(|&s| signed[s] < 0);
    if !has_day {
        return vec![true; spd];
    }
    if !has_night {
        return vec![false; spd];
    }

    let mut filled: Vec<bool> = signed.iter().map(|&v| v > 0).collect();
    for (k, &a) in known.iter().enumerate() {
        let b = known[(k + 1) % known.len()];
        let gap = (b + spd - a) % spd;
        let from = signed[a] > 0;
        let to = signed[b] > 0;
        let switch = if from == to {
            gap
        } else {
            snap_boundary(a, gap, spd, step_minutes)
        };
        for t in 1..gap {
            filled[(a + t) % spd] = if t < switch { from } else { to };
        }
    }
    filled
}

/// Offset `t` in `1..=gap` after known index `a` where the new value starts.
///
/// Prefers the coarsest round clock alignment reachable inside the gap and,
/// within it, the candidate closest to the midpoint.
fn snap_boundary(a: usize, gap: usize, spd: usize, step_minutes: i64) -> usize {
    let natural = (gap + 1) / 2;
    for align in PRETTY_MINUTES {
        if align % step_minutes != 0 {
            continue;
        }
        let stride = (align / step_minutes) as usize;
        let best = (1..=gap)
            .filter(|t| ((a + t) % spd) % stride == 0)
            .min_by_key(|&t| (t.abs_diff(natural), t));
        if let Some(t) = best {
            return t;
        }
    }
    natural
}

/// Night→day step with the most supporting days.
///
/// Ties go to the candidate whose supporting patterns average more night
/// steps per day, then to the earliest step. No transition at all gives 0.
fn choose_boundary(patterns: &[NightPattern], spd: usize) -> usize {
    let mut support = vec![0usize; spd];
    let mut coverage = vec![0usize; spd];
    for pattern in patterns {
        let nights = pattern.night_steps();
        for s in pattern.dawns() {
            support[s] += pattern.days;
            coverage[s] += pattern.days * nights;
        }
    }

    let mut best = 0;
    for s in 1..spd {
        let better_support = support[s] > support[best];
        let same_support = support[s] == support[best] && support[s] > 0;
        // coverage[s] / support[s] > coverage[best] / support[best]
        let better_coverage = same_support && coverage[s] * support[best] > coverage[best] * support[s];
        if better_support || better_coverage {
            best = s;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridBuilder;
    use crate::records::ActivityRecords;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, day, h, m, 0).unwrap()
    }

    fn resolve(records: &ActivityRecords, step: Duration) -> DayNightResolution {
        let layout = GridBuilder::new(step).build(records).unwrap();
        let events: Vec<Event> = records.events().collect();
        DayNightResolution::resolve(&layout, &events)
    }

    /// Hourly events over `days` days, lights on from 06:00 to 18:00
    fn twelve_hour_light(days: u32) -> ActivityRecords {
        let mut timestamps = Vec::new();
        let mut night = Vec::new();
        for d in 1..=days {
            for h in 0..24 {
                timestamps.push(ts(d, h, 0));
                night.push(!(6..18).contains(&h));
            }
        }
        ActivityRecords::new(timestamps).with_night(night).unwrap()
    }

    #[test]
    fn test_consistent_days_share_one_pattern() {
        let resolution = resolve(&twelve_hour_light(3), Duration::hours(1));

        assert_eq!(resolution.patterns().len(), 1);
        assert_eq!(resolution.patterns()[0].days(), 3);
        assert_eq!(resolution.offset_steps(), 6);
        assert_eq!(resolution.boundary(), Duration::hours(6));
        assert_eq!(resolution.patterns()[0].dawns(), vec![6]);
    }

    #[test]
    fn test_conflicting_day_starts_new_pattern() {
        let mut timestamps = Vec::new();
        let mut night = Vec::new();
        for d in 1..=4u32 {
            // lights on at 06:00 for two days, then at 08:00
            let dawn = if d <= 2 { 6 } else { 8 };
            for h in 0..24 {
                timestamps.push(ts(d, h, 0));
                night.push(h < dawn || h >= 18);
            }
        }
        let records = ActivityRecords::new(timestamps).with_night(night).unwrap();
        let resolution = resolve(&records, Duration::hours(1));

        assert_eq!(resolution.patterns().len(), 2);
        assert_eq!(resolution.pattern_for_day(1).unwrap().first_day(), 0);
        assert_eq!(resolution.pattern_for_day(2).unwrap().first_day(), 2);
        // Equal support: 08:00 wins on longer nights
        assert_eq!(resolution.offset_steps(), 8);
    }

    #[test]
    fn test_sparse_labels_snap_to_round_hours() {
        // Day labels at 07:00 and 19:00, a single night label at 23:10
        let records = ActivityRecords::new(vec![ts(1, 7, 0), ts(1, 19, 0), ts(1, 23, 10)])
            .with_night(vec![false, false, true])
            .unwrap();
        let resolution = resolve(&records, Duration::minutes(5));
        let night = resolution.patterns()[0].night();

        // Lights off snapped to 21:00, lights on to 03:00
        assert!(!night[20 * 12 + 11]);
        assert!(night[21 * 12]);
        assert!(night[3 * 12 - 1]);
        assert!(!night[3 * 12]);
        assert_eq!(resolution.boundary(), Duration::hours(3));
    }

    #[test]
    fn test_half_hour_snap_when_no_full_hour_fits() {
        // Day at 19:10, night at 19:55: no full hour inside the gap
        let records = ActivityRecords::new(vec![ts(1, 19, 10), ts(1, 19, 55)])
            .with_night(vec![false, true])
            .unwrap();
        let resolution = resolve(&records, Duration::minutes(5));
        let night = resolution.patterns()[0].night();

        // Midpoint would be 19:35; lights off snaps back to 19:30
        assert!(!night[19 * 12 + 5]);
        assert!(night[19 * 12 + 6]);
        assert!(night[19 * 12 + 11]);
    }

    #[test]
    fn test_unaligned_step_falls_back_to_midpoint() {
        // 45-minute steps divide none of the clock alignments
        let mut signed = vec![0i8; 32];
        signed[0] = -1;
        signed[10] = 1;
        let night = fill_pattern(&signed, 45);

        assert!(!night[4]);
        assert!(night[5]);
        assert!(night[20]);
        assert!(!night[21]);
        assert_eq!(night.iter().filter(|&&n| n).count(), 16);
    }

    #[test]
    fn test_unlabeled_data_is_all_night() {
        let records = ActivityRecords::new(vec![ts(1, 7, 0), ts(2, 7, 0)]);
        let resolution = resolve(&records, Duration::hours(1));

        assert_eq!(resolution.offset_steps(), 0);
        assert!(resolution.night_series(0).iter().all(|&n| n));
    }

    #[test]
    fn test_fill_pattern_one_sided() {
        assert_eq!(fill_pattern(&[0, -1, 0, 0], 60), vec![false; 4]);
        assert_eq!(fill_pattern(&[0, 0, 0, 0], 60), vec![true; 4]);
    }

    #[test]
    fn test_night_series_follows_shift() {
        let resolution = resolve(&twelve_hour_light(2), Duration::hours(1));
        let night = resolution.night_series(6);

        assert_eq!(night.len(), 48);
        for d in 0..2 {
            assert!(night[d * 24..d * 24 + 12].iter().all(|&n| !n));
            assert!(night[d * 24 + 12..(d + 1) * 24].iter().all(|&n| n));
        }
    }
}

//! Time helpers: duration strings, clock times and day arithmetic.
//!
//! The engine works on integer milliseconds internally; `chrono` types are
//! used at the API boundary.

use crate::error::{CycleError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Milliseconds in one minute
pub const MINUTE_MS: i64 = 60_000;

/// Milliseconds in one hour
pub const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Milliseconds in one day
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Minutes in one day
pub const DAY_MINUTES: i64 = 24 * 60;

/// One calendar day as a `Duration`
#[inline]
pub fn day() -> Duration {
    Duration::milliseconds(DAY_MS)
}

/// Floor an epoch-millisecond instant to the start of its UTC day.
#[inline]
pub fn floor_to_day(ms: i64) -> i64 {
    ms - ms.rem_euclid(DAY_MS)
}

/// Convert epoch milliseconds back to an instant.
pub fn instant(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| CycleError::invalid(format!("timestamp out of range: {} ms", ms)))
}

/// Validate a discretization step and return it in whole minutes.
///
/// The step must be a positive whole number of minutes that divides one day.
pub fn step_minutes(step: Duration) -> Result<i64> {
    let ms = step.num_milliseconds();
    if ms <= 0 {
        return Err(CycleError::invalid(format!(
            "step must be positive, got {}",
            format_duration(step)
        )));
    }
    if ms % MINUTE_MS != 0 {
        return Err(CycleError::invalid(format!(
            "step must be a whole number of minutes, got {}",
            format_duration(step)
        )));
    }
    let minutes = ms / MINUTE_MS;
    if DAY_MINUTES % minutes != 0 {
        return Err(CycleError::invalid(format!(
            "there should be a whole number of steps in one day, got {}",
            format_duration(step)
        )));
    }
    Ok(minutes)
}

/// Express `span` as a whole number of `step`s.
///
/// Fails when `span` is negative or not an exact multiple of `step`.
pub fn steps_in(span: Duration, step: Duration, name: &str) -> Result<usize> {
    let span_ms = span.num_milliseconds();
    let step_ms = step.num_milliseconds();
    if span_ms < 0 {
        return Err(CycleError::invalid(format!("{} must be non-negative", name)));
    }
    if step_ms <= 0 || span_ms % step_ms != 0 {
        return Err(CycleError::invalid(format!(
            "{} ({}) should be divisible by step ({})",
            name,
            format_duration(span),
            format_duration(step)
        )));
    }
    Ok((span_ms / step_ms) as usize)
}

/// Parse a compact duration string.
///
/// Accepts one or more `<integer><unit>` tokens with units `d`, `h`, `m`
/// (or `min`), `s` and `ms`: `"5m"`, `"1h30m"`, `"1d"`, `"250ms"`. A bare
/// `"0"` is the zero duration.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    if text.is_empty() {
        return Err(CycleError::ParseError("empty duration".to_string()));
    }
    if text == "0" {
        return Ok(Duration::zero());
    }

    let mut total_ms: i64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(CycleError::ParseError(format!(
                "invalid duration '{}': expected a number before '{}'",
                text, rest
            )));
        }
        let value: i64 = rest[..digits]
            .parse()
            .map_err(|e| CycleError::ParseError(format!("invalid duration '{}': {}", text, e)))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let scale = match rest[..unit_len].trim() {
            "d" => DAY_MS,
            "h" => HOUR_MS,
            "m" | "min" => MINUTE_MS,
            "s" => 1_000,
            "ms" => 1,
            "" => {
                return Err(CycleError::ParseError(format!(
                    "invalid duration '{}': missing unit",
                    text
                )))
            }
            other => {
                return Err(CycleError::ParseError(format!(
                    "invalid duration '{}': unknown unit '{}'",
                    text, other
                )))
            }
        };
        total_ms = value
            .checked_mul(scale)
            .and_then(|v| total_ms.checked_add(v))
            .ok_or_else(|| CycleError::ParseError(format!("duration '{}' overflows", text)))?;
        rest = &rest[unit_len..];
    }

    Ok(Duration::milliseconds(total_ms))
}

/// Format a duration in the compact form accepted by [`parse_duration`].
pub fn format_duration(duration: Duration) -> String {
    let mut ms = duration.num_milliseconds();
    if ms == 0 {
        return "0m".to_string();
    }
    let mut out = String::new();
    if ms < 0 {
        out.push('-');
        ms = -ms;
    }
    for (scale, unit) in [
        (DAY_MS, "d"),
        (HOUR_MS, "h"),
        (MINUTE_MS, "m"),
        (1_000, "s"),
        (1, "ms"),
    ] {
        let count = ms / scale;
        if count > 0 {
            out.push_str(&format!("{}{}", count, unit));
            ms -= count * scale;
        }
    }
    out
}

/// Parse a clock time (`"H"`, `"HH"`, `"H:MM"`, `"HH:MM"`) into minutes
/// since midnight. `"24"` and `"24:00"` denote the end of the day (1440).
pub fn parse_clock_time(input: &str) -> Result<i64> {
    let text = input.trim();
    let (hours, minutes) = match text.split_once(':') {
        Some((h, m)) => (h, m),
        None => (text, "00"),
    };
    let bad = || CycleError::ParseError(format!("invalid clock time '{}'", text));
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return Err(bad());
    }
    let hours: i64 = hours.parse().map_err(|_| bad())?;
    let minutes: i64 = minutes.parse().map_err(|_| bad())?;
    if minutes >= 60 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(bad());
    }
    Ok(hours * 60 + minutes)
}

/// Serde adapter storing a `Duration` as a compact string (`"5m"`).
pub mod duration_str {
    use super::{format_duration, parse_duration};
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

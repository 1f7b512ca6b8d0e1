//! # Circadian Engine
//!
//! Circadian rhythm analysis for irregularly timed activity events.
//!
//! ## Pipeline
//!
//! Raw events are binned onto a uniform grid of whole days, day/night
//! labels are merged into a few canonical 24h patterns, and the grid is
//! re-anchored at the inferred night→day boundary. Days with too little
//! data are masked out and activity is segmented into bouts.
//!
//! ```text
//! [ActivityRecords] → [GridBuilder] → [DayNightResolution] → [DailyMask] → [bouts] → metrics
//! ```
//!
//! Metrics: chi-square periodogram, interdaily stability, intradaily
//! variability, relative amplitude, light-phase activity, activity onset
//! and daily bout statistics.
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `wasm`: WebAssembly bindings via wasm-bindgen
//! - `source`: Async time-series source interface
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use circadian_engine::{ActivityRecords, AnalyzerConfig, BoutParams, CycleAnalyzer, NightSchedule};
//!
//! let start = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
//! let timestamps: Vec<_> = (0..72).map(|h| start + Duration::hours(h)).collect();
//! let records = ActivityRecords::new(timestamps).with_schedule(&NightSchedule::default());
//!
//! let config = AnalyzerConfig::default()
//!     .with_step(Duration::hours(1))
//!     .with_bouts(BoutParams::new(Duration::hours(1), Duration::zero(), 1.0));
//! let analyzer = CycleAnalyzer::new(&records, config).unwrap();
//!
//! assert_eq!(analyzer.night_offset(), Duration::hours(6));
//! let la = analyzer.light_activity(false);
//! println!("light-phase activity = {:.3}", la.total);
//! ```

pub mod analyzer;
pub mod bouts;
pub mod daynight;
pub mod error;
pub mod grid;
pub mod mask;
pub mod metrics;
pub mod onset;
pub mod records;
pub mod stats;
pub mod time;

#[cfg(feature = "source")]
pub mod source;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports
pub use analyzer::{AnalyzerConfig, AnalyzerSummary, CycleAnalyzer};
pub use bouts::BoutParams;
pub use daynight::NightPattern;
pub use error::*;
pub use grid::Grid;
pub use mask::DailyMask;
pub use metrics::{DailyBouts, DailyMetric, Periodogram, PeriodogramParams, RelativeAmplitudeParams};
pub use onset::{KernelMode, OnsetParams};
pub use records::{ActivityRecords, NightSchedule};
pub use stats::AucMethod;
pub use time::{format_duration, parse_duration};

#[cfg(feature = "source")]
pub use source::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine (call once, especially important for WASM)
#[cfg(feature = "wasm")]
pub fn init() {
    console_error_panic_hook::set_once();
}

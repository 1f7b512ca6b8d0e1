//! WebAssembly bindings for the circadian engine.
//!
//! Timestamps cross the boundary as epoch milliseconds and durations as
//! compact strings (`"5m"`, `"1h30m"`). Results come back as JSON strings.
//!
//! ## Usage (JavaScript/TypeScript)
//!
//! ```javascript
//! import init, { WasmCycleAnalyzer } from 'circadian-engine';
//!
//! await init();
//!
//! const analyzer = new WasmCycleAnalyzer(timestampsMs, weights, night, JSON.stringify({ step: '5m' }));
//!
//! const pgram = JSON.parse(analyzer.periodogram(null, '16h', '32h', false));
//! console.log(`peak period = ${pgram.peak_hours} h`);
//!
//! const ra = JSON.parse(analyzer.relativeAmplitude(null, '10h', '5h', false));
//! console.log(`RA = ${ra.total}`);
//! ```

use crate::analyzer::{AnalyzerConfig, CycleAnalyzer};
use crate::bouts::BoutParams;
use crate::error::CycleError;
use crate::metrics::{PeriodogramParams, RelativeAmplitudeParams};
use crate::onset::{KernelMode, OnsetParams};
use crate::records::ActivityRecords;
use crate::time::{instant, parse_duration, HOUR_MS};
use chrono::Duration;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Initialize the WASM module (call once at startup)
#[wasm_bindgen(start)]
pub fn wasm_init() {
    console_error_panic_hook::set_once();
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| CycleError::SerializationError(e.to_string()).into())
}

fn optional_step(step: Option<String>) -> Result<Option<Duration>, JsValue> {
    Ok(step.as_deref().map(parse_duration).transpose()?)
}

fn kernel_mode(name: &str) -> Result<KernelMode, JsValue> {
    match name {
        "step" => Ok(KernelMode::Step),
        "linear" => Ok(KernelMode::Linear),
        "quadratic" => Ok(KernelMode::Quadratic),
        "sine" => Ok(KernelMode::Sine),
        other => Err(CycleError::invalid(format!("unknown kernel mode '{}'", other)).into()),
    }
}

/// WASM-facing analyzer
#[wasm_bindgen]
pub struct WasmCycleAnalyzer {
    analyzer: CycleAnalyzer,
}

#[wasm_bindgen]
impl WasmCycleAnalyzer {
    /// Build from epoch-millisecond timestamps and optional weights / night flags.
    ///
    /// `config_json` is an `AnalyzerConfig` in JSON; missing keys keep their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(
        timestamps_ms: Vec<f64>,
        weights: Option<Vec<f64>>,
        night: Option<Vec<u8>>,
        config_json: Option<String>,
    ) -> Result<WasmCycleAnalyzer, JsValue> {
        let timestamps = timestamps_ms
            .iter()
            .map(|&ms| instant(ms as i64))
            .collect::<Result<Vec<_>, _>>()?;
        let mut records = ActivityRecords::new(timestamps);
        if let Some(weights) = weights {
            records = records.with_weights(weights)?;
        }
        if let Some(night) = night {
            records = records.with_night(night.iter().map(|&n| n != 0).collect())?;
        }

        let config = match config_json {
            Some(json) => {
                let mut value: serde_json::Value = serde_json::from_str(&json)
                    .map_err(|e| CycleError::ParseError(format!("Invalid config: {}", e)))?;
                let mut merged = serde_json::to_value(AnalyzerConfig::default())
                    .map_err(|e| CycleError::SerializationError(e.to_string()))?;
                if let (Some(base), Some(patch)) = (merged.as_object_mut(), value.as_object_mut()) {
                    base.append(patch);
                }
                serde_json::from_value(merged)
                    .map_err(|e| CycleError::ParseError(format!("Invalid config: {}", e)))?
            }
            None => AnalyzerConfig::default(),
        };

        Ok(Self {
            analyzer: CycleAnalyzer::new(&records, config)?,
        })
    }

    /// Recompute the day mask with a new event threshold
    #[wasm_bindgen(js_name = "filterInactive")]
    pub fn filter_inactive(&mut self, min_data_points: usize) {
        self.analyzer.filter_inactive(min_data_points);
    }

    /// Replace the bout policy
    #[wasm_bindgen(js_name = "updateBouts")]
    pub fn update_bouts(&mut self, max_gap: &str, min_duration: &str, min_activity: f64) -> Result<(), JsValue> {
        let params = BoutParams::new(parse_duration(max_gap)?, parse_duration(min_duration)?, min_activity);
        Ok(self.analyzer.update_bouts(params)?)
    }

    /// Masked activity per step
    #[wasm_bindgen(js_name = "activity")]
    pub fn activity(&self) -> Vec<f64> {
        self.analyzer.activity()
    }

    /// Masked step start times (epoch ms)
    #[wasm_bindgen(js_name = "timestamps")]
    pub fn timestamps(&self) -> Result<Vec<f64>, JsValue> {
        Ok(self
            .analyzer
            .timestamps()?
            .iter()
            .map(|t| t.timestamp_millis() as f64)
            .collect())
    }

    /// Chi-square periodogram as `{ periods_hours, powers, peak_hours }`
    #[wasm_bindgen(js_name = "periodogram")]
    pub fn periodogram(
        &self,
        step: Option<String>,
        min_period: &str,
        max_period: &str,
        use_bouts: bool,
    ) -> Result<String, JsValue> {
        let params = PeriodogramParams {
            min_period: parse_duration(min_period)?,
            max_period: parse_duration(max_period)?,
        };
        let pgram = self.analyzer.periodogram(optional_step(step)?, &params, use_bouts)?;
        let hours = |d: Duration| d.num_milliseconds() as f64 / HOUR_MS as f64;
        let peak = pgram.peak().map(hours);
        let periods: Vec<f64> = pgram.periods.iter().map(|&p| hours(p)).collect();
        to_json(&serde_json::json!({
            "periods_hours": periods,
            "powers": pgram.powers,
            "peak_hours": peak,
        }))
    }

    #[wasm_bindgen(js_name = "interdailyStability")]
    pub fn interdaily_stability(&self, step: Option<String>, use_bouts: bool) -> Result<f64, JsValue> {
        Ok(self.analyzer.interdaily_stability(optional_step(step)?, use_bouts)?)
    }

    /// `{ daily, total }`
    #[wasm_bindgen(js_name = "intradailyVariability")]
    pub fn intradaily_variability(&self, step: Option<String>, use_bouts: bool) -> Result<String, JsValue> {
        to_json(&self.analyzer.intradaily_variability(optional_step(step)?, use_bouts)?)
    }

    /// `{ daily, total }`
    #[wasm_bindgen(js_name = "relativeAmplitude")]
    pub fn relative_amplitude(
        &self,
        step: Option<String>,
        most_active: &str,
        least_active: &str,
        use_bouts: bool,
    ) -> Result<String, JsValue> {
        let params = RelativeAmplitudeParams {
            most_active: parse_duration(most_active)?,
            least_active: parse_duration(least_active)?,
        };
        to_json(&self.analyzer.relative_amplitude(optional_step(step)?, &params, use_bouts)?)
    }

    /// `{ daily, total }`
    #[wasm_bindgen(js_name = "lightActivity")]
    pub fn light_activity(&self, use_bouts: bool) -> Result<String, JsValue> {
        to_json(&self.analyzer.light_activity(use_bouts))
    }

    /// Onset of each included day (epoch ms)
    #[wasm_bindgen(js_name = "activityOnset")]
    pub fn activity_onset(
        &self,
        step: Option<String>,
        percentile: f64,
        n: &str,
        m: &str,
        kernel: &str,
        use_bouts: bool,
    ) -> Result<Vec<f64>, JsValue> {
        let params = OnsetParams {
            percentile,
            n: parse_duration(n)?,
            m: parse_duration(m)?,
            kernel: kernel_mode(kernel)?,
        };
        Ok(self
            .analyzer
            .activity_onset(optional_step(step)?, &params, use_bouts)?
            .iter()
            .map(|t| t.timestamp_millis() as f64)
            .collect())
    }

    /// `{ counts, mean_durations }` with durations in `timescale` units
    #[wasm_bindgen(js_name = "dailyBouts")]
    pub fn daily_bouts(&self, timescale: &str) -> Result<String, JsValue> {
        to_json(&self.analyzer.daily_bouts(None, parse_duration(timescale)?)?)
    }

    #[wasm_bindgen(js_name = "getSummary")]
    pub fn get_summary(&self) -> Result<String, JsValue> {
        to_json(&self.analyzer.summary())
    }

    /// Export analyzer state as JSON
    #[wasm_bindgen(js_name = "exportState")]
    pub fn export_state(&self) -> Result<String, JsValue> {
        Ok(self.analyzer.to_json()?)
    }

    /// Import analyzer state from JSON
    #[wasm_bindgen(js_name = "importState")]
    pub fn import_state(json: &str) -> Result<WasmCycleAnalyzer, JsValue> {
        Ok(Self {
            analyzer: CycleAnalyzer::from_json(json)?,
        })
    }

    /// Get engine version
    #[wasm_bindgen(js_name = "version")]
    pub fn version() -> String {
        crate::VERSION.to_string()
    }
}

/// Night flags for epoch-millisecond timestamps from clock-time pairs (`[["18:00", "06:00"]]`)
#[wasm_bindgen(js_name = "labelNight")]
pub fn label_night(timestamps_ms: Vec<f64>, schedule_json: &str) -> Result<Vec<u8>, JsValue> {
    let pairs: Vec<(String, String)> = serde_json::from_str(schedule_json)
        .map_err(|e| CycleError::ParseError(format!("Invalid schedule: {}", e)))?;
    let pairs: Vec<(&str, &str)> = pairs.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let schedule = crate::records::NightSchedule::parse(&pairs)?;

    timestamps_ms
        .iter()
        .map(|&ms| -> Result<u8, JsValue> { Ok(u8::from(schedule.is_night(&instant(ms as i64)?))) })
        .collect()
}

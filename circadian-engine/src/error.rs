//! Error types for the circadian engine.

use thiserror::Error;

/// Main error type for circadian engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    /// Malformed step, period or window argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested range holds no whole day of data
    #[error("No data: {0}")]
    NoData(String),

    /// Parallel input arrays differ in length
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Duration or clock-time string could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Time-series source failure
    #[error("Source error: {0}")]
    SourceError(String),
}

/// Result type alias for circadian engine operations.
pub type Result<T> = std::result::Result<T, CycleError>;

impl CycleError {
    /// Check if the call can be retried with different arguments
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CycleError::InvalidParameter(_) | CycleError::ParseError(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CycleError::InvalidParameter(msg.into())
    }
}

#[cfg(feature = "wasm")]
impl From<CycleError> for wasm_bindgen::JsValue {
    fn from(err: CycleError) -> Self {
        wasm_bindgen::JsValue::from_str(&err.to_string())
    }
}

//! Error types for data parsing in scalecam-types.

use thiserror::Error;

/// Errors that can occur when parsing or converting scalecam values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// A clip file name does not follow `YYYY-MM-DDTHHMMSS.ext`.
    #[error("Invalid clip name '{name}': {reason}")]
    InvalidClipName { name: String, reason: String },

    /// A timestamp could not be parsed or is out of range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Calibration parameters or a calibrated value are unusable.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),
}

impl ParseError {
    pub(crate) fn clip(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidClipName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using scalecam-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

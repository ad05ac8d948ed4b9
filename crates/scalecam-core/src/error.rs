//! Error types for scalecam-core.
//!
//! Errors in the sampling path fall into three groups:
//!
//! | Error | Handling in the sampler |
//! |-------|-------------------------|
//! | [`Error::Transient`], [`Error::Timeout`], [`Error::Io`] | Logged, sampling continues |
//! | [`Error::Hardware`] | Ends the sampling loop |
//! | [`Error::Calibration`] | Skips the trigger decision for one sample |
//!
//! Store errors are retried when [`scalecam_store::Error::is_retryable`]
//! says so; see [`crate::with_retry`].

use std::time::Duration;

use thiserror::Error;

use scalecam_types::ParseError;

/// Errors that can occur while sampling and analysing load-cell data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A statistic was requested over an empty window.
    #[error("Insufficient data")]
    InsufficientData,

    /// The sensor is unusable; sampling cannot continue.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// A single read failed but the sensor may recover.
    #[error("Transient sensor error: {0}")]
    Transient(String),

    /// Storage error.
    #[error(transparent)]
    Store(#[from] scalecam_store::Error),

    /// Raw value could not be converted with the active calibration.
    #[error("Calibration error: {0}")]
    Calibration(#[from] ParseError),

    /// The recording trigger call failed.
    #[error("Trigger {action} failed: {reason}")]
    Trigger { action: String, reason: String },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a hardware error.
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::Hardware(message.into())
    }

    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether the sampling loop must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Hardware(_) | Error::InvalidConfig(_))
    }
}

/// Result type alias using scalecam-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

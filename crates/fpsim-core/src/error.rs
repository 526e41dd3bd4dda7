//! Error taxonomy for the virtual fingerprint sensor.
//!
//! [`Error`] covers what is returned synchronously: caller protocol problems
//! (`Busy`, `AlreadyOpen`, `SessionClosed`), a late UI-ready (`TimedOut`),
//! and setup problems (configuration, hardware). Lockout, cancellation and
//! injected failures belong to the operation and arrive as
//! [`OperationOutcome`](crate::types::OperationOutcome) events carrying an
//! [`ErrorCode`](crate::types::ErrorCode).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Queue and session protocol errors
    #[error("Work queue is full ({capacity} outstanding operations)")]
    Busy { capacity: usize },

    #[error("A session is already open for sensor {sensor_id}")]
    AlreadyOpen { sensor_id: i32 },

    #[error("Session is closed")]
    SessionClosed,

    // Touch sequencing
    #[error("Deadline missed: {elapsed_ms}ms elapsed, limit {timeout_ms}ms")]
    TimedOut { elapsed_ms: u64, timeout_ms: u64 },

    // Hardware errors
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    // Configuration errors
    #[error("Unknown configuration key: {0}")]
    UnknownConfigKey(String),

    #[error("Invalid value for configuration key {key}: {message}")]
    InvalidConfig { key: String, message: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new busy error for a queue of the given capacity.
    pub fn busy(capacity: usize) -> Self {
        Self::Busy { capacity }
    }

    /// Create a new deadline error from elapsed and allowed durations.
    pub fn timed_out(elapsed: Duration, timeout: Duration) -> Self {
        Self::TimedOut {
            elapsed_ms: elapsed.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a new invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new hardware unavailable error.
    pub fn hardware_unavailable(message: impl Into<String>) -> Self {
        Self::HardwareUnavailable(message.into())
    }

    /// Whether the caller may retry the same request later.
    ///
    /// Only `Busy` clears on its own, once the queue drains. Everything else
    /// is either a caller bug or a final state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

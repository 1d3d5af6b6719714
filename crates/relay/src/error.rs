//! Error types for the relay engine.
//!
//! Source errors are always treated as transient and retried. Sink errors
//! are caught at the sink boundary by the fan-out and never abort a cycle.

use ddguard_blynk::BlynkError;
use ddguard_nightscout::NightscoutError;
use thiserror::Error;

/// Failure of one attempt to read a snapshot from the telemetry source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// I/O errors talking to the driver
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver did not answer in time
    #[error("Source timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The driver output was not a snapshot
    #[error("Malformed snapshot: {0}")]
    Decode(#[from] serde_json::Error),

    /// The driver reported a failure
    #[error("Driver failure: {0}")]
    Driver(String),
}

/// Failure of one sink upload.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Dashboard write failed
    #[error("Dashboard error: {0}")]
    Dashboard(#[from] BlynkError),

    /// Tracking-service upload failed
    #[error("Tracking service error: {0}")]
    Tracking(#[from] NightscoutError),

    /// The sink refused the delivery
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Result type for source reads.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for sink writes.
pub type SinkResult<T> = Result<T, SinkError>;

//! Error types for the Nightscout uploader.

use thiserror::Error;

/// Errors from a single Nightscout upload.
#[derive(Debug, Error)]
pub enum NightscoutError {
    /// Connection, TLS or body encoding failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Upload to {endpoint} returned status {status}")]
    Status {
        /// Endpoint path
        endpoint: &'static str,
        /// HTTP status code
        status: u16,
    },

    /// Server address unusable
    #[error("Invalid server address: {0}")]
    InvalidServer(String),
}

/// Result type for Nightscout uploads.
pub type NightscoutResult<T> = Result<T, NightscoutError>;

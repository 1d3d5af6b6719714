//! Error types for the Blynk client.

use thiserror::Error;

/// Errors that can occur talking to a Blynk server.
#[derive(Debug, Error)]
pub enum BlynkError {
    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No live session; the write was not sent
    #[error("Not connected to dashboard server")]
    NotConnected,

    /// The client was shut down
    #[error("Dashboard client closed")]
    Closed,

    /// Malformed or unexpected message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Login rejected by the server
    #[error("Authentication rejected with status {0}")]
    Auth(u16),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for Blynk operations.
pub type BlynkResult<T> = Result<T, BlynkError>;

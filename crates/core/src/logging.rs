//! Logging setup for the DD-Guard daemon.
//!
//! One `tracing` subscriber per process, filtered by `RUST_LOG` (default
//! `info`) and printed either as human-readable lines or as JSON records
//! for syslog/journald collectors.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting the log output format (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "DDGUARD_LOG_FORMAT";

const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per record
    Json,
}

impl LogFormat {
    /// Format named by `DDGUARD_LOG_FORMAT`; anything but `json` means text.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global subscriber. Must be called once, before any logging.
///
/// # Example
/// ```no_run
/// use ddguard_core::logging::{self, LogFormat};
///
/// logging::init_with(LogFormat::Json);
/// tracing::info!(sink = "nightscout", "Sink enabled");
/// ```
pub fn init_with(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Human-readable output.
pub fn init() {
    init_with(LogFormat::Text);
}

/// JSON output.
pub fn init_json() {
    init_with(LogFormat::Json);
}

/// Output in the format selected by `DDGUARD_LOG_FORMAT`.
pub fn init_from_env() {
    init_with(LogFormat::from_env());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_selection() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("text")), LogFormat::Text);
        assert_eq!(LogFormat::parse(Some("")), LogFormat::Text);
        assert_eq!(LogFormat::parse(None), LogFormat::Text);
    }
}

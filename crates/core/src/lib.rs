//! Core plumbing for the DD-Guard telemetry relay.
//!
//! This crate provides the configuration model, its error type, and the
//! logging initialization shared by the relay engine and the daemon.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    Config, DashboardSettings, RelaySettings, SourceSettings, Thresholds, TrackingSettings,
    BGL_DISABLED, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH,
};
pub use error::{ConfigError, ConfigResult};

//! Sink adapters
//!
//! - [`dashboard`]: Blynk virtual pins with tier colors
//! - [`tracking`]: Nightscout entries, device status and treatments

pub mod dashboard;
pub mod tracking;

pub use dashboard::{DashboardLink, DashboardSink};
pub use tracking::{TrackingService, TrackingSink};

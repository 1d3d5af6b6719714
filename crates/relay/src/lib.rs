//! DD-Guard relay engine
//!
//! This crate provides:
//! - The telemetry snapshot and the sensor exception table
//! - The alert classifier and the state threaded between cycles
//! - A bounded-retry fetcher over the telemetry source
//! - Failure-isolated fan-out to the dashboard and tracking sinks
//! - The scheduler with its single-cycle guard

#![warn(missing_docs)]

pub mod classifier;
pub mod error;
pub mod fanout;
pub mod fetcher;
pub mod scheduler;
pub mod sensor;
pub mod sinks;
pub mod state;
pub mod types;

pub use classifier::{classify, ClassifiedResult, ClassifierConfig, Level, Tier};
pub use error::{SinkError, SinkResult, SourceError, SourceResult};
pub use fanout::{Delivery, FanOut, FanOutReport, Sink, SinkOutcome};
pub use fetcher::{RetryPolicy, RetryingFetcher, TelemetrySource};
pub use scheduler::{CycleGuard, CycleReport, Relay, Scheduler, Trigger};
pub use sensor::SensorException;
pub use sinks::{DashboardLink, DashboardSink, TrackingService, TrackingSink};
pub use state::RelayState;
pub use types::{BolusReference, TelemetrySnapshot};

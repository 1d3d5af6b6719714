//! Bounded-retry wrapper around the telemetry source
//!
//! Every source error is treated as transient. The fetcher makes at most
//! `max_attempts` calls per cycle, pausing `backoff` between two failed
//! attempts, and reports "no data" once the attempts are used up.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use ddguard_core::RelaySettings;

use crate::error::SourceResult;
use crate::types::TelemetrySnapshot;

/// External collaborator that produces one snapshot per call
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Read a snapshot from the device
    async fn read_snapshot(&self) -> SourceResult<TelemetrySnapshot>;
}

/// Retry parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per fetch, at least one
    pub max_attempts: u32,
    /// Pause after each failed attempt that will be retried
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Policy with an explicit attempt bound and backoff
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl From<&RelaySettings> for RetryPolicy {
    fn from(settings: &RelaySettings) -> Self {
        Self::new(settings.max_retries, settings.retry_backoff)
    }
}

/// Fetches snapshots with bounded retries
pub struct RetryingFetcher {
    source: Arc<dyn TelemetrySource>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    /// Wrap `source` with `policy`
    pub fn new(source: Arc<dyn TelemetrySource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// First successful snapshot, or `None` after all attempts failed
    pub async fn fetch(&self) -> Option<TelemetrySnapshot> {
        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            match self.source.read_snapshot().await {
                Ok(snapshot) => {
                    debug!(attempt, "Snapshot received");
                    return Some(snapshot);
                }
                Err(e) => {
                    warn!(attempt, max_attempts = max, "Fetching pump data failed: {}", e);
                    if attempt < max {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        error!(attempts = max, "Unable to get data from pump");
        None
    }
}

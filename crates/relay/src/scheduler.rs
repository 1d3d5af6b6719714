//! Cycle scheduling and the reentrancy guard
//!
//! The relay state lives behind a single-slot async mutex. Starting a
//! cycle takes the slot without waiting; a trigger that finds it taken is
//! dropped. The owned guard moves into the spawned cycle task and releases
//! the slot when the task ends, including when it is aborted.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::classifier::{classify, ClassifierConfig, Tier};
use crate::fanout::{FanOut, FanOutReport};
use crate::fetcher::RetryingFetcher;
use crate::state::RelayState;

/// Exclusive access to the relay state for one cycle
pub type CycleToken = OwnedMutexGuard<RelayState>;

/// Single-slot guard around [`RelayState`]
#[derive(Debug, Clone)]
pub struct CycleGuard {
    slot: Arc<Mutex<RelayState>>,
}

impl CycleGuard {
    /// Guard owning `state`
    pub fn new(state: RelayState) -> Self {
        Self {
            slot: Arc::new(Mutex::new(state)),
        }
    }

    /// Take the slot if no cycle holds it
    pub fn try_begin(&self) -> Option<CycleToken> {
        self.slot.clone().try_lock_owned().ok()
    }

    /// Whether a cycle currently holds the slot
    pub fn is_active(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Copy of the state, waiting for a running cycle to finish
    pub async fn state(&self) -> RelayState {
        self.slot.lock().await.clone()
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle number, counted from 0
    pub cycle: u64,
    /// The fetch produced a snapshot
    pub received: bool,
    /// Glucose tier of the cycle
    pub tier: Tier,
    /// Sink results
    pub fanout: FanOutReport,
}

/// Result of a trigger
#[derive(Debug)]
pub enum Trigger {
    /// A new cycle is running on its own task
    Started(JoinHandle<CycleReport>),
    /// A cycle was already running; nothing was started
    Dropped,
}

impl Trigger {
    /// Whether a cycle was started
    pub fn is_started(&self) -> bool {
        matches!(self, Trigger::Started(_))
    }
}

/// The relay engine: fetch, classify, fan out
pub struct Relay {
    fetcher: RetryingFetcher,
    fanout: FanOut,
    classifier: ClassifierConfig,
    guard: CycleGuard,
}

impl Relay {
    /// Engine with a fresh [`RelayState`]
    pub fn new(fetcher: RetryingFetcher, fanout: FanOut, classifier: ClassifierConfig) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            fanout,
            classifier,
            guard: CycleGuard::new(RelayState::new()),
        })
    }

    /// Whether a cycle is in flight
    pub fn is_active(&self) -> bool {
        self.guard.is_active()
    }

    /// Copy of the relay state once no cycle is running
    pub async fn state(&self) -> RelayState {
        self.guard.state().await
    }

    /// Start a cycle on its own task unless one is already running
    pub fn trigger(self: &Arc<Self>) -> Trigger {
        match self.guard.try_begin() {
            Some(mut token) => {
                let relay = Arc::clone(self);
                Trigger::Started(tokio::spawn(async move { relay.run_cycle(&mut token).await }))
            }
            None => {
                warn!("Previous cycle still running, dropping trigger");
                Trigger::Dropped
            }
        }
    }

    /// One fetch, classify and fan-out sequence
    pub async fn run_cycle(&self, state: &mut RelayState) -> CycleReport {
        let cycle = state.cycle_count;
        debug!(cycle, "Cycle started");

        let snapshot = self.fetcher.fetch().await;
        let result = classify(snapshot.as_ref(), &self.classifier, state, Utc::now());
        info!(cycle, tier = ?result.tier, status = %result.status, "Pump data classified");

        let fanout = self.fanout.deliver(snapshot.as_ref(), &result, state).await;
        state.finish_cycle(snapshot.as_ref());

        debug!(cycle, delivered = fanout.delivered, failed = fanout.failed, "Cycle finished");
        CycleReport {
            cycle,
            received: snapshot.is_some(),
            tier: result.tier,
            fanout,
        }
    }

    /// Release sink connections
    pub async fn shutdown(&self) {
        self.fanout.shutdown().await;
    }
}

/// Fixed-interval trigger source
pub struct Scheduler {
    relay: Arc<Relay>,
    interval: Duration,
}

impl Scheduler {
    /// Trigger `relay` every `interval`
    pub fn new(relay: Arc<Relay>, interval: Duration) -> Self {
        Self { relay, interval }
    }

    /// Trigger immediately, then on every tick, until `shutdown` resolves.
    ///
    /// A cycle still running at shutdown is abandoned; the sinks are then
    /// shut down.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut in_flight: Option<JoinHandle<CycleReport>> = None;
        info!(interval_secs = self.interval.as_secs(), "Relay scheduler started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Trigger::Started(handle) = self.relay.trigger() {
                        in_flight = Some(handle);
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                warn!("Abandoning cycle in flight");
                handle.abort();
            }
        }
        self.relay.shutdown().await;
        info!("Relay scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_admits_one_holder() {
        let guard = CycleGuard::new(RelayState::new());
        assert!(!guard.is_active());

        let token = guard.try_begin().expect("slot free");
        assert!(guard.is_active());
        assert!(guard.try_begin().is_none());

        drop(token);
        assert!(!guard.is_active());
        assert!(guard.try_begin().is_some());
    }

    #[tokio::test]
    async fn test_aborted_holder_releases_slot() {
        let guard = CycleGuard::new(RelayState::new());
        let mut token = guard.try_begin().expect("slot free");
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            token.cycle_count = 7;
            let _ = started_tx.send(());
            std::future::pending::<()>().await;
        });
        started_rx.await.expect("cycle task started");
        assert!(guard.is_active());

        task.abort();
        let _ = task.await;
        assert!(!guard.is_active());
        assert_eq!(guard.state().await.cycle_count, 7);
    }
}

//! Failure-isolated delivery to the enabled sinks
//!
//! Each sink gets the same [`Delivery`]. A sink error is logged and then
//! forgotten; it never stops the remaining sinks or the cycle. The only
//! state a sink can change is the uploaded-bolus reference, and only by
//! reporting a successful upload in its [`SinkOutcome`].

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::classifier::ClassifiedResult;
use crate::error::SinkResult;
use crate::state::RelayState;
use crate::types::{BolusReference, TelemetrySnapshot};

/// What a sink receives for one cycle
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// Fetched snapshot; `None` for a "no data" cycle
    pub snapshot: Option<&'a TelemetrySnapshot>,
    /// Classified view of the snapshot
    pub result: &'a ClassifiedResult,
    /// Most recently uploaded bolus
    pub last_bolus_reference: Option<BolusReference>,
}

impl Delivery<'_> {
    /// Whether the snapshot carries a bolus that was not uploaded yet
    pub fn bolus_pending(&self) -> Option<BolusReference> {
        let reference = self.snapshot?.last_bolus_reference;
        if reference == BolusReference::NONE {
            return None;
        }
        (self.last_bolus_reference != Some(reference)).then_some(reference)
    }
}

/// What a sink accomplished for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkOutcome {
    /// Bolus reference uploaded during this delivery
    pub uploaded_bolus: Option<BolusReference>,
    /// Names of the individual uploads that failed
    pub failed_uploads: Vec<&'static str>,
}

impl SinkOutcome {
    /// Every write went through
    pub fn is_clean(&self) -> bool {
        self.failed_uploads.is_empty()
    }
}

/// An output of the relay, constructed only when configured
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in log records
    fn name(&self) -> &'static str;

    /// Push one cycle's result
    async fn deliver(&self, delivery: &Delivery<'_>) -> SinkResult<SinkOutcome>;

    /// Release held connections before exit
    async fn shutdown(&self) {}
}

/// Summary of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Sinks that received the result without any failure
    pub delivered: usize,
    /// Sinks that failed entirely or in part
    pub failed: usize,
}

/// The set of enabled sinks
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn Sink>>,
}

impl FanOut {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a sink
    pub fn push(&mut self, sink: Box<dyn Sink>) {
        info!(sink = sink.name(), "Sink enabled");
        self.sinks.push(sink);
    }

    /// Builder-style [`FanOut::push`]
    pub fn with(mut self, sink: Box<dyn Sink>) -> Self {
        self.push(sink);
        self
    }

    /// Number of enabled sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// No sink is enabled
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver to every sink in turn, isolating failures
    pub async fn deliver(
        &self,
        snapshot: Option<&TelemetrySnapshot>,
        result: &ClassifiedResult,
        state: &mut RelayState,
    ) -> FanOutReport {
        let mut report = FanOutReport::default();

        for sink in &self.sinks {
            let delivery = Delivery {
                snapshot,
                result,
                last_bolus_reference: state.last_bolus_reference,
            };

            match sink.deliver(&delivery).await {
                Ok(outcome) => {
                    if let Some(reference) = outcome.uploaded_bolus {
                        debug!(sink = sink.name(), %reference, "Bolus recorded as uploaded");
                        state.record_bolus_upload(reference);
                    }
                    if outcome.is_clean() {
                        report.delivered += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    error!(sink = sink.name(), "Sink delivery failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Shut every sink down
    pub async fn shutdown(&self) {
        for sink in &self.sinks {
            sink.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::types::fixtures;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _delivery: &Delivery<'_>) -> SinkResult<SinkOutcome> {
            Err(SinkError::Rejected("offline".to_string()))
        }
    }

    struct CountingSink {
        calls: Arc<AtomicUsize>,
        claim_bolus: bool,
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, delivery: &Delivery<'_>) -> SinkResult<SinkOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let uploaded_bolus = if self.claim_bolus {
                delivery.bolus_pending()
            } else {
                None
            };
            Ok(SinkOutcome {
                uploaded_bolus,
                failed_uploads: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_sinks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fanout = FanOut::new().with(Box::new(FailingSink)).with(Box::new(CountingSink {
            calls: calls.clone(),
            claim_bolus: false,
        }));

        let snapshot = fixtures::snapshot(100);
        let result = ClassifiedResult::no_data();
        let mut state = RelayState::new();
        let report = fanout.deliver(Some(&snapshot), &result, &mut state).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report, FanOutReport { delivered: 1, failed: 1 });
        assert_eq!(state.last_bolus_reference, None);
    }

    #[tokio::test]
    async fn test_uploaded_bolus_updates_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fanout = FanOut::new().with(Box::new(CountingSink {
            calls,
            claim_bolus: true,
        }));

        let snapshot = fixtures::snapshot(100);
        let result = ClassifiedResult::no_data();
        let mut state = RelayState::new();
        fanout.deliver(Some(&snapshot), &result, &mut state).await;

        assert_eq!(state.last_bolus_reference, Some(snapshot.last_bolus_reference));
    }

    #[test]
    fn test_bolus_pending_needs_new_reference() {
        let snapshot = fixtures::snapshot(100);
        let mut empty_history = fixtures::snapshot(100);
        empty_history.last_bolus_reference = BolusReference::NONE;
        let result = ClassifiedResult::no_data();
        let mut delivery = Delivery {
            snapshot: Some(&snapshot),
            result: &result,
            last_bolus_reference: None,
        };
        assert_eq!(delivery.bolus_pending(), Some(snapshot.last_bolus_reference));

        delivery.last_bolus_reference = Some(snapshot.last_bolus_reference);
        assert_eq!(delivery.bolus_pending(), None);

        delivery.snapshot = None;
        delivery.last_bolus_reference = None;
        assert_eq!(delivery.bolus_pending(), None);

        delivery.snapshot = Some(&empty_history);
        assert_eq!(delivery.bolus_pending(), None);
    }
}

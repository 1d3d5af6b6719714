//! Process-lifetime relay state
//!
//! Threaded through successive cycles by the scheduler. Only the single
//! active cycle mutates it; see [`crate::scheduler::CycleGuard`].

use chrono::{DateTime, FixedOffset};

use crate::classifier::BatterySource;
use crate::types::{BolusReference, TelemetrySnapshot};

/// State carried from one cycle to the next
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayState {
    /// Completed cycles, including ones without data
    pub cycle_count: u64,
    /// Most recently uploaded bolus
    pub last_bolus_reference: Option<BolusReference>,
    /// Last-bolus time seen by the previous cycle
    pub previous_bolus_time: Option<DateTime<FixedOffset>>,
}

impl RelayState {
    /// Fresh state at process start
    pub fn new() -> Self {
        Self::default()
    }

    /// Battery shown this cycle: pump on even cycles, sensor on odd ones
    pub fn battery_source(&self) -> BatterySource {
        if self.cycle_count % 2 == 0 {
            BatterySource::Pump
        } else {
            BatterySource::Sensor
        }
    }

    /// Record a successful bolus upload
    pub fn record_bolus_upload(&mut self, reference: BolusReference) {
        self.last_bolus_reference = Some(reference);
    }

    /// Close a cycle: advance the counter and remember the bolus time seen
    pub fn finish_cycle(&mut self, snapshot: Option<&TelemetrySnapshot>) {
        self.cycle_count = self.cycle_count.wrapping_add(1);
        if let Some(snapshot) = snapshot {
            self.previous_bolus_time = Some(snapshot.last_bolus_time);
        }
    }
}

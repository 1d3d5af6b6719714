//! Tracking-service sink
//!
//! Up to four independent Nightscout uploads per cycle: the glucose entry,
//! the device status, a correction bolus not uploaded before and, when
//! enabled, the current basal rate. Each one can fail without affecting
//! the others.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::sync::Arc;
use tracing::{debug, error, info};

use ddguard_nightscout::{
    device_id, BolusTreatment, DeviceStatus, Direction, Entry, InsulinOnBoard, NightscoutClient,
    NightscoutResult, PumpBattery, PumpState, PumpStatus, TempBasalTreatment, UPLOADER_BATTERY,
};

use crate::classifier::hours_minutes;
use crate::error::SinkResult;
use crate::fanout::{Delivery, Sink, SinkOutcome};
use crate::sensor::is_sensor_lost;
use crate::types::TelemetrySnapshot;

/// Name of the glucose entry upload
pub const UPLOAD_ENTRY: &str = "entries";
/// Name of the device status upload
pub const UPLOAD_DEVICE_STATUS: &str = "devicestatus";
/// Name of the bolus treatment upload
pub const UPLOAD_BOLUS: &str = "bolus";
/// Name of the temp basal treatment upload
pub const UPLOAD_TEMP_BASAL: &str = "tempbasal";

/// The Nightscout endpoints the sink posts to
#[async_trait]
pub trait TrackingService: Send + Sync {
    /// Post a glucose entry
    async fn upload_entry(&self, entry: &Entry) -> NightscoutResult<()>;

    /// Post a device status
    async fn upload_device_status(&self, status: &DeviceStatus) -> NightscoutResult<()>;

    /// Post a bolus treatment
    async fn upload_bolus(&self, bolus: &BolusTreatment) -> NightscoutResult<()>;

    /// Post a temp basal treatment
    async fn upload_temp_basal(&self, basal: &TempBasalTreatment) -> NightscoutResult<()>;
}

#[async_trait]
impl TrackingService for NightscoutClient {
    async fn upload_entry(&self, entry: &Entry) -> NightscoutResult<()> {
        NightscoutClient::upload_entry(self, entry).await
    }

    async fn upload_device_status(&self, status: &DeviceStatus) -> NightscoutResult<()> {
        NightscoutClient::upload_device_status(self, status).await
    }

    async fn upload_bolus(&self, bolus: &BolusTreatment) -> NightscoutResult<()> {
        NightscoutClient::upload_bolus(self, bolus).await
    }

    async fn upload_temp_basal(&self, basal: &TempBasalTreatment) -> NightscoutResult<()> {
        NightscoutClient::upload_temp_basal(self, basal).await
    }
}

/// Glucose entry for a snapshot; `None` for the "sensor lost" pattern
pub fn glucose_entry(snapshot: &TelemetrySnapshot) -> Option<Entry> {
    if is_sensor_lost(snapshot.glucose, snapshot.trend) {
        return None;
    }

    let (sgv, direction) = match snapshot.sensor_exception() {
        Some(exception) => {
            let translation = exception.tracking();
            (translation.sgv, translation.direction)
        }
        None => (snapshot.glucose, Direction::from_trend(snapshot.trend)),
    };

    Some(Entry::sgv(
        &snapshot.serial,
        snapshot.sensor_time.to_rfc3339_opts(SecondsFormat::Secs, false),
        millis(&snapshot.sensor_time),
        sgv,
        direction,
    ))
}

/// Summary shown next to the pump pill: sensor battery and calibration
/// time, present only while the sensor is connected
pub fn pump_summary(snapshot: &TelemetrySnapshot) -> String {
    if !snapshot.pump_status.cgm_active {
        return String::new();
    }

    let mut status = String::from(" | ");
    if snapshot.sensor_status.exception == 0 {
        status.push_str(&format!("{}% ", snapshot.sensor_battery));
    }
    if snapshot.calibration_minutes > 0 {
        status.push_str(&hours_minutes(snapshot.calibration_minutes));
        status.push('h');
    }
    status
}

/// Device status for a snapshot
pub fn device_status(snapshot: &TelemetrySnapshot) -> DeviceStatus {
    let clock = millis(&snapshot.pump_time);
    DeviceStatus {
        device: device_id(&snapshot.serial),
        created_at: clock,
        uploader_battery: UPLOADER_BATTERY,
        pump: PumpStatus {
            clock,
            reservoir: snapshot.reservoir_units,
            battery: PumpBattery {
                percent: snapshot.pump_battery,
            },
            iob: InsulinOnBoard {
                timestamp: clock,
                bolusiob: snapshot.active_insulin,
            },
            status: PumpState {
                bolusing: snapshot.pump_status.is_bolusing(),
                suspended: snapshot.pump_status.suspended,
                status: pump_summary(snapshot),
            },
        },
    }
}

/// Correction bolus treatment for the snapshot's last bolus
pub fn bolus_treatment(snapshot: &TelemetrySnapshot) -> BolusTreatment {
    BolusTreatment::correction(
        &snapshot.serial,
        millis(&snapshot.last_bolus_time),
        snapshot.recent_glucose_reading(),
        snapshot.last_bolus_amount,
    )
}

/// Current basal rate as a temp basal treatment
pub fn temp_basal(snapshot: &TelemetrySnapshot) -> TempBasalTreatment {
    TempBasalTreatment::current_rate(
        &snapshot.serial,
        millis(&snapshot.pump_time),
        snapshot.current_basal_rate,
    )
}

fn millis(time: &DateTime<FixedOffset>) -> i64 {
    time.timestamp_millis()
}

/// Nightscout sink over a [`TrackingService`]
pub struct TrackingSink {
    service: Arc<dyn TrackingService>,
    upload_basal: bool,
}

impl TrackingSink {
    /// Sink posting through `service`
    pub fn new(service: Arc<dyn TrackingService>, upload_basal: bool) -> Self {
        Self {
            service,
            upload_basal,
        }
    }
}

fn record(outcome: &mut SinkOutcome, upload: &'static str, result: NightscoutResult<()>) -> bool {
    match result {
        Ok(()) => {
            debug!(upload, "Upload succeeded");
            true
        }
        Err(e) => {
            error!(upload, "Uploading {} record failed: {}", upload, e);
            outcome.failed_uploads.push(upload);
            false
        }
    }
}

#[async_trait]
impl Sink for TrackingSink {
    fn name(&self) -> &'static str {
        "nightscout"
    }

    async fn deliver(&self, delivery: &Delivery<'_>) -> SinkResult<SinkOutcome> {
        let mut outcome = SinkOutcome::default();
        let snapshot = match delivery.snapshot {
            Some(snapshot) => snapshot,
            None => {
                debug!("No snapshot this cycle, nothing to upload");
                return Ok(outcome);
            }
        };

        match glucose_entry(snapshot) {
            Some(entry) => {
                let result = self.service.upload_entry(&entry).await;
                record(&mut outcome, UPLOAD_ENTRY, result);
            }
            None => info!("Sensor lost, not uploading glucose entry"),
        }

        let result = self.service.upload_device_status(&device_status(snapshot)).await;
        record(&mut outcome, UPLOAD_DEVICE_STATUS, result);

        if let Some(reference) = delivery.bolus_pending() {
            let result = self.service.upload_bolus(&bolus_treatment(snapshot)).await;
            if record(&mut outcome, UPLOAD_BOLUS, result) {
                info!(%reference, amount = snapshot.last_bolus_amount, "Uploaded bolus");
                outcome.uploaded_bolus = Some(reference);
            }
        }

        if self.upload_basal {
            let result = self.service.upload_temp_basal(&temp_basal(snapshot)).await;
            record(&mut outcome, UPLOAD_TEMP_BASAL, result);
        }

        Ok(outcome)
    }
}

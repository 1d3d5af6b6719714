//! Telemetry snapshot as reported by the pump driver
//!
//! Field names on the wire follow the driver's camelCase naming.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sensor::SensorException;

/// Opaque identifier of the most recent bolus event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BolusReference(pub u64);

impl BolusReference {
    /// Reported while the pump history holds no bolus
    pub const NONE: BolusReference = BolusReference(0);
}

impl fmt::Display for BolusReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device-reported alert flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertFlags {
    /// Delivery suspended
    pub suspend: bool,
    /// Delivery suspended on low glucose
    pub suspend_low: bool,
    /// Low glucose alert active
    pub on_low: bool,
    /// High glucose alert active
    pub on_high: bool,
    /// Predicted low alert active
    pub before_low: bool,
    /// Predicted high alert active
    pub before_high: bool,
}

/// Pump delivery state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PumpStatusFlags {
    /// Sensor connected to the pump
    pub cgm_active: bool,
    /// Normal bolus in progress
    pub bolusing_normal: bool,
    /// Square wave bolus in progress
    pub bolusing_square: bool,
    /// Dual wave bolus in progress
    pub bolusing_dual: bool,
    /// Delivery suspended
    pub suspended: bool,
}

impl PumpStatusFlags {
    /// Any kind of bolus in progress
    pub fn is_bolusing(&self) -> bool {
        self.bolusing_normal || self.bolusing_square || self.bolusing_dual
    }
}

/// Sensor state word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorStatus {
    /// Non-zero while the sensor reports an exception
    pub exception: u16,
}

/// Point-in-time reading from the pump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Sensor glucose, or a reserved exception code
    #[serde(rename = "sensorBGL")]
    pub glucose: u16,
    /// Trend arrow, -3..=3
    #[serde(rename = "trendArrow")]
    pub trend: i8,
    /// Time of the sensor reading
    #[serde(rename = "sensorBGLTimestamp")]
    pub sensor_time: DateTime<FixedOffset>,
    /// Pump clock at capture
    pub pump_time: DateTime<FixedOffset>,
    /// Pump battery percentage
    #[serde(rename = "batteryLevelPercentage")]
    pub pump_battery: u8,
    /// Sensor transmitter battery percentage
    #[serde(rename = "sensorBatteryLevelPercentage")]
    pub sensor_battery: u8,
    /// Insulin units left in the reservoir
    #[serde(rename = "insulinUnitsRemaining")]
    pub reservoir_units: f64,
    /// Active insulin units
    pub active_insulin: f64,
    /// Units delivered by the last bolus
    pub last_bolus_amount: f64,
    /// Time of the last bolus
    pub last_bolus_time: DateTime<FixedOffset>,
    /// Identifier of the last bolus
    pub last_bolus_reference: BolusReference,
    /// Recent meter/sensor glucose; 0 when unknown
    #[serde(rename = "recentBGL", default)]
    pub recent_glucose: u16,
    /// Minutes until the next calibration is due
    #[serde(rename = "sensorCalMinutesRemaining", default)]
    pub calibration_minutes: u32,
    /// Current basal rate in units per hour
    #[serde(default)]
    pub current_basal_rate: f64,
    /// Device alert flags
    #[serde(default)]
    pub alerts: AlertFlags,
    /// Delivery state
    #[serde(default)]
    pub pump_status: PumpStatusFlags,
    /// Sensor state
    #[serde(default)]
    pub sensor_status: SensorStatus,
    /// Pump serial number
    pub serial: String,
}

impl TelemetrySnapshot {
    /// Decode a snapshot from the driver's JSON output
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sensor exception encoded in the glucose field, if any
    pub fn sensor_exception(&self) -> Option<SensorException> {
        SensorException::from_code(self.glucose)
    }

    /// Recent glucose, `None` when the pump reports 0
    pub fn recent_glucose_reading(&self) -> Option<u16> {
        if self.recent_glucose == 0 {
            None
        } else {
            Some(self.recent_glucose)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, Utc};

    /// A regular snapshot captured at `now` with no alerts
    pub fn snapshot_at(now: DateTime<chrono::Utc>, glucose: u16) -> TelemetrySnapshot {
        let offset = FixedOffset::east_opt(0).expect("valid offset");
        let time = now.with_timezone(&offset);
        TelemetrySnapshot {
            glucose,
            trend: 0,
            sensor_time: time,
            pump_time: time,
            pump_battery: 75,
            sensor_battery: 40,
            reservoir_units: 120.0,
            active_insulin: 1.5,
            last_bolus_amount: 2.0,
            last_bolus_time: time - Duration::hours(3),
            last_bolus_reference: BolusReference(1000),
            recent_glucose: 0,
            calibration_minutes: 0,
            current_basal_rate: 0.8,
            alerts: AlertFlags::default(),
            pump_status: PumpStatusFlags {
                cgm_active: true,
                ..PumpStatusFlags::default()
            },
            sensor_status: SensorStatus::default(),
            serial: "NG1234567H".to_string(),
        }
    }

    pub fn snapshot(glucose: u16) -> TelemetrySnapshot {
        snapshot_at(Utc::now(), glucose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRIVER_JSON: &str = r#"{
        "sensorBGL": 127,
        "trendArrow": -1,
        "sensorBGLTimestamp": "2021-01-02T10:15:00+01:00",
        "pumpTime": "2021-01-02T10:16:30+01:00",
        "batteryLevelPercentage": 50,
        "sensorBatteryLevelPercentage": 85,
        "insulinUnitsRemaining": 96.5,
        "activeInsulin": 1.275,
        "lastBolusAmount": 3.2,
        "lastBolusTime": "2021-01-02T09:40:00+01:00",
        "lastBolusReference": 4242,
        "recentBGL": 140,
        "sensorCalMinutesRemaining": 125,
        "alerts": {"beforeHigh": true},
        "pumpStatus": {"cgmActive": true, "bolusingSquare": true},
        "serial": "NG1234567H"
    }"#;

    #[test]
    fn test_decode_driver_json() {
        let snapshot = TelemetrySnapshot::from_json(DRIVER_JSON).expect("decodes");
        assert_eq!(snapshot.glucose, 127);
        assert_eq!(snapshot.trend, -1);
        assert_eq!(snapshot.last_bolus_reference, BolusReference(4242));
        assert_eq!(snapshot.recent_glucose_reading(), Some(140));
        assert_eq!(snapshot.calibration_minutes, 125);
        assert!(snapshot.alerts.before_high);
        assert!(!snapshot.alerts.suspend);
        assert!(snapshot.pump_status.is_bolusing());
        assert_eq!(snapshot.sensor_status.exception, 0);
        assert_eq!(snapshot.current_basal_rate, 0.0);
        assert!(snapshot.sensor_exception().is_none());
    }

    #[test]
    fn test_missing_required_field_fails() {
        let json = DRIVER_JSON.replace("\"serial\": \"NG1234567H\"", "\"other\": 1");
        assert!(TelemetrySnapshot::from_json(&json).is_err());
    }

    #[test]
    fn test_zero_recent_glucose_is_unknown() {
        let mut snapshot = fixtures::snapshot(100);
        snapshot.recent_glucose = 0;
        assert_eq!(snapshot.recent_glucose_reading(), None);
    }
}

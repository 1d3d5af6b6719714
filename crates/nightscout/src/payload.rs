//! Nightscout REST payloads
//!
//! JSON bodies for the `entries`, `devicestatus` and `treatments`
//! endpoints, plus the service's trend directions and error sentinels.

use serde::Serialize;

/// Device URI prefix; the pump serial is appended
pub const DEVICE_PREFIX: &str = "medtronic-600://";

/// Uploader battery level reported with every device status
pub const UPLOADER_BATTERY: u8 = 100;

/// Duration in minutes of an uploaded temp basal
pub const TEMP_BASAL_MINUTES: u32 = 5;

/// Build the device identifier for a pump serial
pub fn device_id(serial: &str) -> String {
    format!("{}{}", DEVICE_PREFIX, serial)
}

/// Trend direction names understood by Nightscout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// No direction
    #[serde(rename = "NONE")]
    None,
    /// Rising very fast
    TripleUp,
    /// Rising fast
    DoubleUp,
    /// Rising
    SingleUp,
    /// Rising slowly
    FortyFiveUp,
    /// Stable
    Flat,
    /// Falling slowly
    FortyFiveDown,
    /// Falling
    SingleDown,
    /// Falling fast
    DoubleDown,
    /// Falling very fast
    TripleDown,
    /// Trend cannot be computed (sensor exception)
    #[serde(rename = "NOT COMPUTABLE")]
    NotComputable,
    /// Rate outside the representable range
    #[serde(rename = "RATE OUT OF RANGE")]
    RateOutOfRange,
}

impl Direction {
    /// Map a pump trend arrow (-3..=3) to a direction
    pub fn from_trend(trend: i8) -> Self {
        match trend {
            -3 => Direction::TripleDown,
            -2 => Direction::DoubleDown,
            -1 => Direction::SingleDown,
            0 => Direction::Flat,
            1 => Direction::SingleUp,
            2 => Direction::DoubleUp,
            3 => Direction::TripleUp,
            _ => Direction::RateOutOfRange,
        }
    }
}

/// Sentinel sgv values Nightscout renders as sensor error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorSgv {
    /// "?SN"
    SensorNotActive = 1,
    /// "?MD"
    MinimalDeviation = 2,
    /// "?NA"
    NoAntenna = 3,
    /// "?NC"
    SensorNotCalibrated = 5,
    /// "?CD"
    CountsDeviation = 6,
    /// "?AD"
    AbsoluteDeviation = 9,
    /// "???"
    PowerDeviation = 10,
    /// "?RF"
    BadRf = 12,
}

impl ErrorSgv {
    /// Wire value
    pub fn value(self) -> u16 {
        self as u16
    }
}

/// Glucose entry for `entries.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// Device identifier
    pub device: String,
    /// Always `sgv`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// ISO-8601 reading time
    #[serde(rename = "dateString")]
    pub date_string: String,
    /// Reading time in epoch milliseconds
    pub date: i64,
    /// Glucose value or error sentinel
    pub sgv: u16,
    /// Trend direction
    pub direction: Direction,
}

impl Entry {
    /// Sensor glucose entry
    pub fn sgv(serial: &str, date_string: String, date: i64, sgv: u16, direction: Direction) -> Self {
        Self {
            device: device_id(serial),
            kind: "sgv",
            date_string,
            date,
            sgv,
            direction,
        }
    }
}

/// Body for `devicestatus.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    /// Device identifier
    pub device: String,
    /// Pump clock in epoch milliseconds
    pub created_at: i64,
    /// Uploader battery percentage
    #[serde(rename = "uploaderBattery")]
    pub uploader_battery: u8,
    /// Pump section
    pub pump: PumpStatus,
}

/// Pump section of a device status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpStatus {
    /// Pump clock in epoch milliseconds
    pub clock: i64,
    /// Insulin units remaining
    pub reservoir: f64,
    /// Pump battery
    pub battery: PumpBattery,
    /// Insulin on board
    pub iob: InsulinOnBoard,
    /// Delivery state
    pub status: PumpState,
}

/// Pump battery level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PumpBattery {
    /// Percentage
    pub percent: u8,
}

/// Active insulin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsulinOnBoard {
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Active bolus insulin units
    pub bolusiob: f64,
}

/// Delivery state flags and free-text summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PumpState {
    /// Any bolus in progress
    pub bolusing: bool,
    /// Delivery suspended
    pub suspended: bool,
    /// Summary shown next to the pump pill
    pub status: String,
}

/// Correction bolus for `treatments`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BolusTreatment {
    /// Always `Correction Bolus`
    #[serde(rename = "eventType")]
    pub event_type: &'static str,
    /// Bolus time in epoch milliseconds
    pub created_at: i64,
    /// Recent glucose, null when unknown
    pub glucose: Option<u16>,
    /// Bolus units
    pub insulin: f64,
    /// Device identifier
    pub device: String,
}

impl BolusTreatment {
    /// Correction bolus treatment
    pub fn correction(serial: &str, created_at: i64, glucose: Option<u16>, insulin: f64) -> Self {
        Self {
            event_type: "Correction Bolus",
            created_at,
            glucose,
            insulin,
            device: device_id(serial),
        }
    }
}

/// Current basal rate posted as a temp basal to `treatments`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempBasalTreatment {
    /// Always `Temp Basal`
    #[serde(rename = "eventType")]
    pub event_type: &'static str,
    /// Device identifier
    pub device: String,
    /// Reading time in epoch milliseconds
    pub created_at: i64,
    /// Basal rate in units per hour
    pub absolute: f64,
    /// Minutes
    pub duration: u32,
}

impl TempBasalTreatment {
    /// Temp basal treatment
    pub fn current_rate(serial: &str, created_at: i64, absolute: f64) -> Self {
        Self {
            event_type: "Temp Basal",
            device: device_id(serial),
            created_at,
            absolute,
            duration: TEMP_BASAL_MINUTES,
        }
    }
}

//! Sensor exception codes
//!
//! The pump reports sensor conditions by putting a reserved code in the
//! glucose field instead of a reading. Each code maps to a status message
//! and to the sentinel value and trend Nightscout uses for it.

use ddguard_nightscout::{Direction, ErrorSgv};

/// Trend code of the steepest decline
pub const STEEPEST_DECLINE: i8 = -3;

/// Nightscout sgv substituted for a "reading too low" exception
pub const TRACKING_SGV_LOW: u16 = 40;

/// Nightscout sgv substituted for a "reading too high" exception
pub const TRACKING_SGV_HIGH: u16 = 400;

/// Reserved glucose-field codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SensorException {
    /// Sensor warming up
    WarmUp = 0x0301,
    /// Calibration needed
    CalibrationNeeded = 0x0302,
    /// Sensor error, pump is updating
    SensorError = 0x0303,
    /// Calibration error
    CalibrationError = 0x0304,
    /// Sensor must be changed
    ChangeSensor = 0x0305,
    /// Sensor end of life
    EndOfLife = 0x0306,
    /// Sensor not ready
    NotReady = 0x0307,
    /// Reading above measurable range
    ReadingHigh = 0x0308,
    /// Reading below measurable range
    ReadingLow = 0x0309,
    /// Calibration in progress
    CalibrationPending = 0x030A,
    /// Calibration error, sensor must be changed
    ChangeSensorCalError = 0x030B,
    /// Pump time unknown
    TimeUnknown = 0x030C,
    /// Sensor signal lost
    SensorLost = 0x030D,
}

/// How an exception is reported to Nightscout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingTranslation {
    /// Sentinel glucose value
    pub sgv: u16,
    /// Trend marker
    pub direction: Direction,
}

impl SensorException {
    /// All codes, in numeric order
    pub const ALL: [SensorException; 13] = [
        SensorException::WarmUp,
        SensorException::CalibrationNeeded,
        SensorException::SensorError,
        SensorException::CalibrationError,
        SensorException::ChangeSensor,
        SensorException::EndOfLife,
        SensorException::NotReady,
        SensorException::ReadingHigh,
        SensorException::ReadingLow,
        SensorException::CalibrationPending,
        SensorException::ChangeSensorCalError,
        SensorException::TimeUnknown,
        SensorException::SensorLost,
    ];

    /// Look up a glucose-field value
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    /// Raw code
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Status text shown on the dashboard
    pub fn message(self) -> &'static str {
        match self {
            SensorException::WarmUp => "Sensor warm up",
            SensorException::CalibrationNeeded => "Calibrate sensor",
            SensorException::SensorError => "Updating sensor",
            SensorException::CalibrationError => "Calibration error",
            SensorException::ChangeSensor => "Change sensor",
            SensorException::EndOfLife => "Sensor expired",
            SensorException::NotReady => "Sensor not ready",
            SensorException::ReadingHigh => "Sensor value high",
            SensorException::ReadingLow => "Sensor value low",
            SensorException::CalibrationPending => "Calibrating",
            SensorException::ChangeSensorCalError => "Calibration error, change sensor",
            SensorException::TimeUnknown => "Time unknown",
            SensorException::SensorLost => "Lost sensor",
        }
    }

    /// Sentinel value and trend marker for the glucose entry upload
    pub fn tracking(self) -> TrackingTranslation {
        let (sgv, direction) = match self {
            SensorException::CalibrationNeeded | SensorException::CalibrationError => {
                (ErrorSgv::SensorNotCalibrated.value(), Direction::NotComputable)
            }
            SensorException::ChangeSensor
            | SensorException::ChangeSensorCalError
            | SensorException::EndOfLife => {
                (ErrorSgv::SensorNotActive.value(), Direction::NotComputable)
            }
            SensorException::ReadingLow => (TRACKING_SGV_LOW, Direction::RateOutOfRange),
            SensorException::ReadingHigh => (TRACKING_SGV_HIGH, Direction::RateOutOfRange),
            SensorException::WarmUp
            | SensorException::SensorError
            | SensorException::NotReady
            | SensorException::CalibrationPending
            | SensorException::TimeUnknown
            | SensorException::SensorLost => {
                (ErrorSgv::NoAntenna.value(), Direction::NotComputable)
            }
        };
        TrackingTranslation { sgv, direction }
    }
}

/// The pump's "sensor lost" pattern: a zero reading with the steepest decline
pub fn is_sensor_lost(glucose: u16, trend: i8) -> bool {
    glucose == 0 && trend == STEEPEST_DECLINE
}

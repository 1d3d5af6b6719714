//! Alert classification
//!
//! Turns a snapshot (or its absence) into the tier and display fields the
//! sinks need. Classification is pure: the caller supplies the prior
//! [`RelayState`] and the current time.

use chrono::{DateTime, Utc};
use std::time::Duration;

use ddguard_core::Thresholds;

use crate::sensor::SensorException;
use crate::state::RelayState;
use crate::types::TelemetrySnapshot;

/// Status text of a cycle without data
pub const NO_DATA_STATUS: &str = "No data from pump";

/// Trend text when no trend can be shown
pub const BLANK_TREND: &str = "--";

/// Battery at or below this percentage is critical
pub const BATTERY_CRITICAL_PCT: u8 = 25;
/// Battery at or below this percentage is a warning
pub const BATTERY_WARNING_PCT: u8 = 50;
/// Reservoir at or below this many units is critical
pub const RESERVOIR_CRITICAL_UNITS: f64 = 25.0;
/// Reservoir at or below this many units is a warning
pub const RESERVOIR_WARNING_UNITS: f64 = 75.0;

/// Severity tier of the glucose display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Delivery suspended by the pump
    Suspend,
    /// Reading beyond the low/high limits
    OutOfRange,
    /// Reading beyond the pre-alert limits
    PreAlert,
    /// Reading within limits
    Normal,
    /// Sensor exception or no data
    Exception,
}

/// Three-step level for battery and reservoir gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Comfortably high
    Normal,
    /// Getting low
    Warning,
    /// Needs attention now
    Critical,
}

impl Level {
    /// Level of a battery percentage
    pub fn battery(percent: u8) -> Self {
        if percent <= BATTERY_CRITICAL_PCT {
            Level::Critical
        } else if percent <= BATTERY_WARNING_PCT {
            Level::Warning
        } else {
            Level::Normal
        }
    }

    /// Level of the insulin units left
    pub fn reservoir(units: f64) -> Self {
        if units <= RESERVOIR_CRITICAL_UNITS {
            Level::Critical
        } else if units <= RESERVOIR_WARNING_UNITS {
            Level::Warning
        } else {
            Level::Normal
        }
    }
}

/// Which battery the dashboard shows this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatterySource {
    /// Pump battery
    Pump,
    /// Sensor transmitter battery
    Sensor,
}

impl BatterySource {
    /// Widget label for this battery
    pub fn label(self) -> &'static str {
        match self {
            BatterySource::Pump => "PUMP BATTERY %",
            BatterySource::Sensor => "SENSOR BATTERY %",
        }
    }
}

/// Battery gauge contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryDisplay {
    /// Battery shown
    pub source: BatterySource,
    /// Percentage
    pub percent: u8,
    /// Gauge level
    pub level: Level,
}

/// Reservoir gauge contents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirDisplay {
    /// Units remaining
    pub units: f64,
    /// Gauge level
    pub level: Level,
}

/// Insulin figure shown next to the trend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsulinDisplay {
    /// Running active insulin
    ActiveInsulin(f64),
    /// Amount of a bolus delivered since the previous cycle
    Bolus(f64),
}

/// Classification inputs fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Glucose thresholds
    pub thresholds: Thresholds,
    /// Relay poll interval; twice this is the recent-bolus window
    pub poll_interval: Duration,
}

/// Derived view of one cycle's snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedResult {
    /// Glucose tier
    pub tier: Tier,
    /// Glucose to display; `None` for exception tiers
    pub glucose: Option<u16>,
    /// Sensor exception in the glucose field
    pub exception: Option<SensorException>,
    /// Trend arrow text
    pub trend: String,
    /// Insulin figure; `None` without data
    pub insulin: Option<InsulinDisplay>,
    /// Human-readable status line
    pub status: String,
    /// Battery gauge; `None` without data
    pub battery: Option<BatteryDisplay>,
    /// Reservoir gauge; `None` without data
    pub reservoir: Option<ReservoirDisplay>,
}

impl ClassifiedResult {
    /// Result of a cycle whose fetch produced nothing
    pub fn no_data() -> Self {
        Self {
            tier: Tier::Exception,
            glucose: None,
            exception: None,
            trend: BLANK_TREND.to_string(),
            insulin: None,
            status: NO_DATA_STATUS.to_string(),
            battery: None,
            reservoir: None,
        }
    }

    /// Trend and insulin composite, e.g. `↑ / 1.5U` or `→ / B 2.0U`
    pub fn trend_line(&self) -> String {
        if self.exception.is_some() {
            return BLANK_TREND.to_string();
        }
        match self.insulin {
            Some(InsulinDisplay::ActiveInsulin(units)) => format!("{} / {:.1}U", self.trend, units),
            Some(InsulinDisplay::Bolus(units)) => format!("{} / B {:.1}U", self.trend, units),
            None => self.trend.clone(),
        }
    }
}

/// Classify a snapshot against the thresholds and the prior state
pub fn classify(
    snapshot: Option<&TelemetrySnapshot>,
    config: &ClassifierConfig,
    state: &RelayState,
    now: DateTime<Utc>,
) -> ClassifiedResult {
    let snapshot = match snapshot {
        Some(snapshot) => snapshot,
        None => return ClassifiedResult::no_data(),
    };

    let exception = snapshot.sensor_exception();
    let (tier, glucose, trend, status) = match exception {
        Some(exception) => (
            Tier::Exception,
            None,
            BLANK_TREND.to_string(),
            exception.message().to_string(),
        ),
        None => (
            glucose_tier(snapshot, &config.thresholds),
            Some(snapshot.glucose),
            trend_arrow(snapshot.trend).to_string(),
            status_line(snapshot),
        ),
    };

    let source = state.battery_source();
    let percent = match source {
        BatterySource::Pump => snapshot.pump_battery,
        BatterySource::Sensor => snapshot.sensor_battery,
    };

    ClassifiedResult {
        tier,
        glucose,
        exception,
        trend,
        insulin: Some(insulin_display(snapshot, state, config.poll_interval, now)),
        status,
        battery: Some(BatteryDisplay {
            source,
            percent,
            level: Level::battery(percent),
        }),
        reservoir: Some(ReservoirDisplay {
            units: snapshot.reservoir_units,
            level: Level::reservoir(snapshot.reservoir_units),
        }),
    }
}

/// Tier of a regular reading; first matching rule wins
pub fn glucose_tier(snapshot: &TelemetrySnapshot, thresholds: &Thresholds) -> Tier {
    let glucose = snapshot.glucose;
    let alerts = &snapshot.alerts;

    if alerts.suspend || alerts.suspend_low {
        Tier::Suspend
    } else if glucose < thresholds.low || glucose > thresholds.high || alerts.on_low || alerts.on_high
    {
        Tier::OutOfRange
    } else if glucose < thresholds.pre_low
        || glucose > thresholds.pre_high
        || alerts.before_low
        || alerts.before_high
    {
        Tier::PreAlert
    } else {
        Tier::Normal
    }
}

/// Arrow text for a trend code
pub fn trend_arrow(trend: i8) -> &'static str {
    match trend {
        -3 => "↓↓↓",
        -2 => "↓↓",
        -1 => "↓",
        0 => "→",
        1 => "↑",
        2 => "↑↑",
        3 => "↑↑↑",
        _ => BLANK_TREND,
    }
}

/// Minutes formatted as `H:MM`
pub fn hours_minutes(minutes: u32) -> String {
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

fn status_line(snapshot: &TelemetrySnapshot) -> String {
    let mut status = format!("Last update {}", snapshot.sensor_time.format("%H:%M:%S"));
    if snapshot.calibration_minutes > 0 {
        status.push_str(" | Cal in ");
        status.push_str(&hours_minutes(snapshot.calibration_minutes));
    }
    status
}

fn insulin_display(
    snapshot: &TelemetrySnapshot,
    state: &RelayState,
    poll_interval: Duration,
    now: DateTime<Utc>,
) -> InsulinDisplay {
    let changed = state.previous_bolus_time != Some(snapshot.last_bolus_time);
    let window = i64::try_from(poll_interval.as_secs().saturating_mul(2)).unwrap_or(i64::MAX);
    let age = now
        .signed_duration_since(snapshot.last_bolus_time)
        .num_seconds()
        .abs();

    if changed && age <= window {
        InsulinDisplay::Bolus(snapshot.last_bolus_amount)
    } else {
        InsulinDisplay::ActiveInsulin(snapshot.active_insulin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::snapshot_at;
    use chrono::TimeZone;

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            thresholds: Thresholds::new(70, 80, 180, 250),
            poll_interval: Duration::from_secs(300),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 2, 10, 15, 0).single().expect("valid time")
    }

    fn tier_of(glucose: u16) -> Tier {
        classify(Some(&snapshot_at(now(), glucose)), &config(), &RelayState::new(), now()).tier
    }

    #[test]
    fn test_normal_reading() {
        assert_eq!(tier_of(95), Tier::Normal);
    }

    #[test]
    fn test_below_low_is_out_of_range() {
        assert_eq!(tier_of(65), Tier::OutOfRange);
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(tier_of(70), Tier::PreAlert);
        assert_eq!(tier_of(79), Tier::PreAlert);
        assert_eq!(tier_of(80), Tier::Normal);
        assert_eq!(tier_of(180), Tier::Normal);
        assert_eq!(tier_of(181), Tier::PreAlert);
        assert_eq!(tier_of(250), Tier::PreAlert);
        assert_eq!(tier_of(251), Tier::OutOfRange);
    }

    #[test]
    fn test_disabled_upper_bounds_never_fire() {
        let config = ClassifierConfig {
            thresholds: Thresholds::new(70, 80, 0, 0),
            poll_interval: Duration::from_secs(300),
        };
        for glucose in [181, 400, 0x02FF] {
            let result = classify(
                Some(&snapshot_at(now(), glucose)),
                &config,
                &RelayState::new(),
                now(),
            );
            assert_eq!(result.tier, Tier::Normal, "glucose {}", glucose);
        }
    }

    #[test]
    fn test_suspend_beats_out_of_range() {
        let mut snapshot = snapshot_at(now(), 40);
        snapshot.alerts.suspend_low = true;
        snapshot.alerts.on_low = true;
        let result = classify(Some(&snapshot), &config(), &RelayState::new(), now());
        assert_eq!(result.tier, Tier::Suspend);

        let mut snapshot = snapshot_at(now(), 300);
        snapshot.alerts.suspend = true;
        assert_eq!(glucose_tier(&snapshot, &config().thresholds), Tier::Suspend);
    }

    #[test]
    fn test_device_flags_raise_tier() {
        let mut snapshot = snapshot_at(now(), 120);
        snapshot.alerts.on_high = true;
        assert_eq!(glucose_tier(&snapshot, &config().thresholds), Tier::OutOfRange);

        let mut snapshot = snapshot_at(now(), 120);
        snapshot.alerts.before_low = true;
        assert_eq!(glucose_tier(&snapshot, &config().thresholds), Tier::PreAlert);
    }

    #[test]
    fn test_exception_code_skips_thresholds() {
        let mut snapshot = snapshot_at(now(), SensorException::EndOfLife.code());
        snapshot.alerts.suspend = true;
        snapshot.trend = 2;
        let result = classify(Some(&snapshot), &config(), &RelayState::new(), now());

        assert_eq!(result.tier, Tier::Exception);
        assert_eq!(result.exception, Some(SensorException::EndOfLife));
        assert_eq!(result.glucose, None);
        assert_eq!(result.trend, BLANK_TREND);
        assert_eq!(result.trend_line(), BLANK_TREND);
        assert_eq!(result.status, "Sensor expired");
        assert!(result.battery.is_some());
    }

    #[test]
    fn test_no_data_result() {
        let result = classify(None, &config(), &RelayState::new(), now());
        assert_eq!(result, ClassifiedResult::no_data());
        assert_eq!(result.tier, Tier::Exception);
        assert_eq!(result.status, NO_DATA_STATUS);
        assert_eq!(result.trend_line(), BLANK_TREND);
    }

    #[test]
    fn test_status_line_with_calibration() {
        let mut snapshot = snapshot_at(now(), 100);
        snapshot.calibration_minutes = 125;
        let result = classify(Some(&snapshot), &config(), &RelayState::new(), now());
        assert_eq!(result.status, "Last update 10:15:00 | Cal in 2:05");

        snapshot.calibration_minutes = 0;
        let result = classify(Some(&snapshot), &config(), &RelayState::new(), now());
        assert_eq!(result.status, "Last update 10:15:00");
    }

    #[test]
    fn test_battery_selection_follows_cycle_parity() {
        let snapshot = snapshot_at(now(), 100);
        let mut state = RelayState::new();

        let even = classify(Some(&snapshot), &config(), &state, now());
        let battery = even.battery.expect("battery shown");
        assert_eq!(battery.source.label(), "PUMP BATTERY %");
        assert_eq!(battery.percent, 75);
        assert_eq!(battery.level, Level::Normal);

        state.cycle_count = 1;
        let odd = classify(Some(&snapshot), &config(), &state, now());
        let battery = odd.battery.expect("battery shown");
        assert_eq!(battery.source.label(), "SENSOR BATTERY %");
        assert_eq!(battery.percent, 40);
        assert_eq!(battery.level, Level::Warning);
    }

    #[test]
    fn test_gauge_levels() {
        assert_eq!(Level::battery(25), Level::Critical);
        assert_eq!(Level::battery(26), Level::Warning);
        assert_eq!(Level::battery(50), Level::Warning);
        assert_eq!(Level::battery(51), Level::Normal);
        assert_eq!(Level::reservoir(25.0), Level::Critical);
        assert_eq!(Level::reservoir(75.0), Level::Warning);
        assert_eq!(Level::reservoir(75.5), Level::Normal);
    }

    #[test]
    fn test_recent_new_bolus_is_displayed() {
        let mut snapshot = snapshot_at(now(), 100);
        snapshot.last_bolus_time = snapshot.sensor_time - chrono::Duration::minutes(4);
        let result = classify(Some(&snapshot), &config(), &RelayState::new(), now());
        assert_eq!(result.insulin, Some(InsulinDisplay::Bolus(2.0)));
        assert_eq!(result.trend_line(), "→ / B 2.0U");
    }

    #[test]
    fn test_bolus_seen_last_cycle_shows_active_insulin() {
        let mut snapshot = snapshot_at(now(), 100);
        snapshot.last_bolus_time = snapshot.sensor_time - chrono::Duration::minutes(4);
        let state = RelayState {
            previous_bolus_time: Some(snapshot.last_bolus_time),
            ..RelayState::new()
        };
        let result = classify(Some(&snapshot), &config(), &state, now());
        assert_eq!(result.insulin, Some(InsulinDisplay::ActiveInsulin(1.5)));
        assert_eq!(result.trend_line(), "→ / 1.5U");
    }

    #[test]
    fn test_old_bolus_shows_active_insulin() {
        let mut snapshot = snapshot_at(now(), 100);
        snapshot.last_bolus_time = snapshot.sensor_time - chrono::Duration::minutes(11);
        let result = classify(Some(&snapshot), &config(), &RelayState::new(), now());
        assert_eq!(result.insulin, Some(InsulinDisplay::ActiveInsulin(1.5)));
    }

    #[test]
    fn test_trend_arrows() {
        assert_eq!(trend_arrow(-3), "↓↓↓");
        assert_eq!(trend_arrow(0), "→");
        assert_eq!(trend_arrow(2), "↑↑");
        assert_eq!(trend_arrow(9), BLANK_TREND);
    }

    #[test]
    fn test_hours_minutes() {
        assert_eq!(hours_minutes(5), "0:05");
        assert_eq!(hours_minutes(60), "1:00");
        assert_eq!(hours_minutes(719), "11:59");
    }
}

//! Dashboard sink
//!
//! Writes the classified result to Blynk virtual pins. Glucose and status
//! follow the glucose tier; the battery and reservoir gauges use their own
//! levels.

use async_trait::async_trait;
use std::sync::Arc;

use ddguard_blynk::{BlynkClient, BlynkResult};

use crate::classifier::{ClassifiedResult, Level, Tier};
use crate::error::SinkResult;
use crate::fanout::{Delivery, Sink, SinkOutcome};

/// Glucose value
pub const PIN_GLUCOSE: u8 = 1;
/// Battery gauge
pub const PIN_BATTERY: u8 = 2;
/// Reservoir gauge
pub const PIN_RESERVOIR: u8 = 3;
/// Trend and insulin composite
pub const PIN_TREND: u8 = 4;
/// Status line
pub const PIN_STATUS: u8 = 5;

/// Normal color
pub const GREEN: &str = "#23C48E";
/// Suspend color
pub const BLUE: &str = "#04C0F8";
/// Warning color
pub const YELLOW: &str = "#ED9D00";
/// Alarm color
pub const RED: &str = "#D3435C";

const COLOR: &str = "color";
const LABEL: &str = "label";

/// Widget color of a glucose tier
pub fn tier_color(tier: Tier) -> &'static str {
    match tier {
        Tier::Suspend => BLUE,
        Tier::OutOfRange | Tier::Exception => RED,
        Tier::PreAlert => YELLOW,
        Tier::Normal => GREEN,
    }
}

/// Widget color of a gauge level
pub fn level_color(level: Level) -> &'static str {
    match level {
        Level::Critical => RED,
        Level::Warning => YELLOW,
        Level::Normal => GREEN,
    }
}

/// Pin-level access to the dashboard
#[async_trait]
pub trait DashboardLink: Send + Sync {
    /// Write a value to a virtual pin
    async fn virtual_write(&self, pin: u8, value: String) -> BlynkResult<()>;

    /// Set a widget property
    async fn set_property(&self, pin: u8, property: &'static str, value: String) -> BlynkResult<()>;

    /// Close the connection
    async fn disconnect(&self);
}

#[async_trait]
impl DashboardLink for BlynkClient {
    async fn virtual_write(&self, pin: u8, value: String) -> BlynkResult<()> {
        BlynkClient::virtual_write(self, pin, value).await
    }

    async fn set_property(&self, pin: u8, property: &'static str, value: String) -> BlynkResult<()> {
        BlynkClient::set_property(self, pin, property, value).await
    }

    async fn disconnect(&self) {
        BlynkClient::disconnect(self).await
    }
}

/// Dashboard sink over a [`DashboardLink`]
pub struct DashboardSink {
    link: Arc<dyn DashboardLink>,
}

impl DashboardSink {
    /// Sink writing through `link`
    pub fn new(link: Arc<dyn DashboardLink>) -> Self {
        Self { link }
    }

    async fn write(&self, pin: u8, value: String, color: &'static str) -> BlynkResult<()> {
        self.link.virtual_write(pin, value).await?;
        self.link.set_property(pin, COLOR, color.to_string()).await
    }

    async fn write_result(&self, result: &ClassifiedResult) -> BlynkResult<()> {
        let glucose = result.glucose.map(|g| g.to_string()).unwrap_or_default();
        self.write(PIN_GLUCOSE, glucose, tier_color(result.tier)).await?;
        self.link.virtual_write(PIN_TREND, result.trend_line()).await?;

        let status_color = if result.tier == Tier::Exception { RED } else { GREEN };
        self.write(PIN_STATUS, result.status.clone(), status_color).await?;

        if let Some(battery) = result.battery {
            self.link
                .set_property(PIN_BATTERY, LABEL, battery.source.label().to_string())
                .await?;
            self.write(PIN_BATTERY, battery.percent.to_string(), level_color(battery.level))
                .await?;
        }
        if let Some(reservoir) = result.reservoir {
            self.write(
                PIN_RESERVOIR,
                format!("{}", reservoir.units),
                level_color(reservoir.level),
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for DashboardSink {
    fn name(&self) -> &'static str {
        "blynk"
    }

    async fn deliver(&self, delivery: &Delivery<'_>) -> SinkResult<SinkOutcome> {
        self.write_result(delivery.result).await?;
        Ok(SinkOutcome::default())
    }

    async fn shutdown(&self) {
        self.link.disconnect().await;
    }
}

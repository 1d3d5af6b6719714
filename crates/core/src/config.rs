//! Configuration management for the DD-Guard relay.
//!
//! The configuration is a TOML file loaded once at startup. Sections for
//! the dashboard and tracking-service sinks are optional; a sink is only
//! enabled when every one of its required fields is non-empty.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "DDGUARD_CONFIG";

/// Configuration file used when `DDGUARD_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ddguard.toml";

/// Glucose bound that no reading can exceed; used for disabled upper thresholds.
pub const BGL_DISABLED: u16 = u16::MAX;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_SECS: u64 = 5;
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BLYNK_SERVER: &str = "blynk-cloud.com";
const DEFAULT_BLYNK_PORT: u16 = 80;
const DEFAULT_BLYNK_HEARTBEAT_SECS: u64 = 20;

/// Glucose alert thresholds.
///
/// Upper bounds configured as 0 are stored as [`BGL_DISABLED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Below this the reading is out of range
    pub low: u16,
    /// Below this the reading triggers a pre-alert
    pub pre_low: u16,
    /// Above this the reading triggers a pre-alert
    pub pre_high: u16,
    /// Above this the reading is out of range
    pub high: u16,
}

impl Thresholds {
    /// Build thresholds, normalizing disabled (zero) upper bounds.
    pub fn new(low: u16, pre_low: u16, pre_high: u16, high: u16) -> Self {
        Self {
            low,
            pre_low,
            pre_high: normalize_upper(pre_high),
            high: normalize_upper(high),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.low > self.pre_low {
            return Err(ConfigError::Invalid(format!(
                "bgl_low ({}) must not exceed bgl_pre_low ({})",
                self.low, self.pre_low
            )));
        }
        if self.pre_high != BGL_DISABLED && self.pre_high > self.high {
            return Err(ConfigError::Invalid(format!(
                "bgl_pre_high ({}) must not exceed bgl_high ({})",
                self.pre_high, self.high
            )));
        }
        Ok(())
    }
}

fn normalize_upper(value: u16) -> u16 {
    if value == 0 {
        BGL_DISABLED
    } else {
        value
    }
}

/// Scheduling and retry parameters of the relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    /// Time between two triggered cycles
    pub poll_interval: Duration,
    /// Total fetch attempts per cycle
    pub max_retries: u32,
    /// Pause between two failed fetch attempts
    pub retry_backoff: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        }
    }
}

/// External helper that runs the device driver and prints one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Executable to run
    pub command: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Upper bound on one driver run
    pub timeout: Duration,
}

/// Blynk dashboard connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSettings {
    /// Blynk server host name
    pub server: String,
    /// Blynk server port
    pub port: u16,
    /// Device auth token
    pub token: String,
    /// Heartbeat interval announced to and pinged at the server
    pub heartbeat: Duration,
}

/// Nightscout tracking-service connection.
#[derive(Clone)]
pub struct TrackingSettings {
    /// Nightscout base URL, with or without scheme
    pub server: String,
    /// Plain API secret; hashed before it goes on the wire
    pub secret: Zeroizing<String>,
    /// Also post the current basal rate as a temp basal treatment
    pub upload_basal: bool,
}

impl fmt::Debug for TrackingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingSettings")
            .field("server", &self.server)
            .field("secret", &"<redacted>")
            .field("upload_basal", &self.upload_basal)
            .finish()
    }
}

/// Validated, immutable relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheduling and retry parameters
    pub relay: RelaySettings,
    /// Telemetry source helper
    pub source: SourceSettings,
    /// Glucose thresholds
    pub thresholds: Thresholds,
    /// Dashboard sink, when fully configured
    pub dashboard: Option<DashboardSettings>,
    /// Tracking-service sink, when fully configured
    pub tracking: Option<TrackingSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    relay: RelaySection,
    source: Option<SourceSection>,
    blynk: Option<BlynkSection>,
    nightscout: Option<NightscoutSection>,
    bgl: Option<BglSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RelaySection {
    poll_interval_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SourceSection {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BlynkSection {
    #[serde(default)]
    server: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    token: String,
    heartbeat: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NightscoutSection {
    #[serde(default)]
    server: String,
    #[serde(default)]
    secret: String,
    #[serde(default)]
    upload_basal: bool,
}

#[derive(Debug, Deserialize)]
struct BglSection {
    bgl_low: Option<u16>,
    bgl_pre_low: Option<u16>,
    bgl_pre_high: Option<u16>,
    bgl_high: Option<u16>,
}

impl Config {
    /// Path of the configuration file: `DDGUARD_CONFIG` or the default.
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Read and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Self::from_sections(file)
    }

    fn from_sections(file: ConfigFile) -> ConfigResult<Self> {
        let relay = relay_settings(file.relay)?;

        let source = file.source.ok_or(ConfigError::Missing("source.command"))?;
        let command = source
            .command
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::Missing("source.command"))?;
        let source = SourceSettings {
            command,
            args: source.args,
            timeout: Duration::from_secs(source.timeout_secs.unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS)),
        };

        let bgl = file.bgl.ok_or(ConfigError::Missing("bgl"))?;
        let thresholds = Thresholds::new(
            bgl.bgl_low.ok_or(ConfigError::Missing("bgl.bgl_low"))?,
            bgl.bgl_pre_low.ok_or(ConfigError::Missing("bgl.bgl_pre_low"))?,
            bgl.bgl_pre_high.ok_or(ConfigError::Missing("bgl.bgl_pre_high"))?,
            bgl.bgl_high.ok_or(ConfigError::Missing("bgl.bgl_high"))?,
        );
        thresholds.validate()?;

        Ok(Self {
            relay,
            source,
            thresholds,
            dashboard: file.blynk.and_then(dashboard_settings),
            tracking: file.nightscout.and_then(tracking_settings),
        })
    }
}

fn relay_settings(section: RelaySection) -> ConfigResult<RelaySettings> {
    let defaults = RelaySettings::default();
    let settings = RelaySettings {
        poll_interval: section
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval),
        max_retries: section.max_retries.unwrap_or(defaults.max_retries),
        retry_backoff: section
            .retry_backoff_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry_backoff),
    };

    if settings.poll_interval.is_zero() {
        return Err(ConfigError::Invalid(
            "relay.poll_interval_secs must be greater than 0".to_string(),
        ));
    }
    if settings.max_retries == 0 {
        return Err(ConfigError::Invalid(
            "relay.max_retries must be greater than 0".to_string(),
        ));
    }
    Ok(settings)
}

fn dashboard_settings(section: BlynkSection) -> Option<DashboardSettings> {
    let server = section
        .server
        .unwrap_or_else(|| DEFAULT_BLYNK_SERVER.to_string());
    let server = server.trim();
    let token = section.token.trim();
    if server.is_empty() || token.is_empty() {
        return None;
    }
    Some(DashboardSettings {
        server: server.to_string(),
        port: section.port.unwrap_or(DEFAULT_BLYNK_PORT),
        token: token.to_string(),
        heartbeat: Duration::from_secs(section.heartbeat.unwrap_or(DEFAULT_BLYNK_HEARTBEAT_SECS)),
    })
}

fn tracking_settings(section: NightscoutSection) -> Option<TrackingSettings> {
    let server = section.server.trim();
    let secret = Zeroizing::new(section.secret);
    if server.is_empty() || secret.trim().is_empty() {
        return None;
    }
    Some(TrackingSettings {
        server: server.to_string(),
        secret: Zeroizing::new(secret.trim().to_string()),
        upload_basal: section.upload_basal,
    })
}

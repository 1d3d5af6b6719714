//! Telemetry source backed by the external driver helper
//!
//! Each read runs the configured command once and decodes the single JSON
//! snapshot it prints on stdout.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use ddguard_core::SourceSettings;
use ddguard_relay::{SourceError, SourceResult, TelemetrySnapshot, TelemetrySource};

pub struct CommandSource {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(settings: &SourceSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            timeout: settings.timeout,
        }
    }
}

#[async_trait]
impl TelemetrySource for CommandSource {
    async fn read_snapshot(&self) -> SourceResult<TelemetrySnapshot> {
        debug!(command = %self.command, "Running pump driver");

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Driver(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(TelemetrySnapshot::from_json(stdout.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SNAPSHOT_JSON: &str = r#"{
        "sensorBGL": 98,
        "trendArrow": 1,
        "sensorBGLTimestamp": "2021-01-02T10:15:00+01:00",
        "pumpTime": "2021-01-02T10:16:00+01:00",
        "batteryLevelPercentage": 50,
        "sensorBatteryLevelPercentage": 85,
        "insulinUnitsRemaining": 96.5,
        "activeInsulin": 1.3,
        "lastBolusAmount": 3.2,
        "lastBolusTime": "2021-01-02T09:40:00+01:00",
        "lastBolusReference": 4242,
        "serial": "NG1234567H"
    }"#;

    fn shell(script: &str, timeout: Duration) -> CommandSource {
        CommandSource::new(&SourceSettings {
            command: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout,
        })
    }

    #[tokio::test]
    async fn test_reads_snapshot_from_stdout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT_JSON.as_bytes()).unwrap();

        let source = CommandSource::new(&SourceSettings {
            command: "cat".to_string(),
            args: vec![file.path().display().to_string()],
            timeout: Duration::from_secs(10),
        });

        let snapshot = source.read_snapshot().await.unwrap();
        assert_eq!(snapshot.glucose, 98);
        assert_eq!(snapshot.serial, "NG1234567H");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_driver_error() {
        let source = shell("echo 'no pump found' >&2; exit 3", Duration::from_secs(10));
        match source.read_snapshot().await {
            Err(SourceError::Driver(message)) => assert!(message.contains("no pump found")),
            other => panic!("expected driver error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_output_is_decode_error() {
        let source = shell("echo 'not json'", Duration::from_secs(10));
        assert!(matches!(source.read_snapshot().await, Err(SourceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_slow_driver_times_out() {
        let source = shell("sleep 5", Duration::from_millis(100));
        assert!(matches!(source.read_snapshot().await, Err(SourceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_missing_command_is_io_error() {
        let source = CommandSource::new(&SourceSettings {
            command: "/nonexistent/ddguard-driver".to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(source.read_snapshot().await, Err(SourceError::Io(_))));
    }
}

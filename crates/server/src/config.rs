use std::path::Path;

use serde::Deserialize;

use telehouse_clickhouse::ClickHouseConfig;
use telehouse_core::SignalKind;
use telehouse_exporter::{ExporterSettings, OutputConfig, QueueConfig, RetryConfig, TimeoutConfig};

use crate::error::ServerError;

/// Top-level configuration for the Telehouse server, loaded from a TOML file.
///
/// # Example
///
/// ```toml
/// [clickhouse]
/// endpoint = "http://localhost:8123"
/// database = "telemetry"
/// ttl = "72h"
///
/// [exporter]
/// prefix = "[edge-1]"
///
/// [signals]
/// metrics = false
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelehouseConfig {
    /// Connection target and schema policy.
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    /// Push path output options.
    #[serde(default)]
    pub exporter: OutputConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub retry_on_failure: RetryConfig,
    #[serde(default)]
    pub sending_queue: QueueConfig,
    /// Which signal kinds get an exporter.
    #[serde(default)]
    pub signals: SignalsConfig,
    /// Process log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TelehouseConfig {
    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ServerError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    ///
    /// The second value reports whether the file was found.
    pub fn load(path: &Path) -> Result<(Self, bool), ServerError> {
        if !path.exists() {
            return Ok((Self::default(), false));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok((Self::from_toml(&contents)?, true))
    }

    /// Settings for one exporter instance.
    pub fn exporter_settings(&self) -> ExporterSettings {
        ExporterSettings {
            clickhouse: self.clickhouse.clone(),
            output: self.exporter.clone(),
            timeout: self.timeout.clone(),
            retry_on_failure: self.retry_on_failure.clone(),
            sending_queue: self.sending_queue.clone(),
        }
    }
}

/// Per-signal enable flags. Every signal is enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_true")]
    pub traces: bool,
    #[serde(default = "default_true")]
    pub metrics: bool,
    #[serde(default = "default_true")]
    pub logs: bool,
}

impl SignalsConfig {
    pub fn is_enabled(&self, signal: SignalKind) -> bool {
        match signal {
            SignalKind::Traces => self.traces,
            SignalKind::Metrics => self.metrics,
            SignalKind::Logs => self.logs,
        }
    }

    /// Enabled signals in start-up order.
    pub fn enabled(&self) -> Vec<SignalKind> {
        SignalKind::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            traces: true,
            metrics: true,
            logs: true,
        }
    }
}

/// Log output of the server process itself.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Colorize output.
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_file_is_log_only_with_every_signal() {
        let config = TelehouseConfig::from_toml("").unwrap();
        assert!(config.clickhouse.is_log_only());
        assert_eq!(
            config.signals.enabled(),
            [SignalKind::Traces, SignalKind::Metrics, SignalKind::Logs]
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn full_document() {
        let config = TelehouseConfig::from_toml(
            r#"
            [clickhouse]
            endpoint = "https://ch.internal:8443"
            username = "otel"
            password = "hunter2"
            database = "telemetry"
            cluster_name = "main"
            ttl = "48h"

            [clickhouse.connection_params]
            max_execution_time = "60"

            [exporter]
            prefix = "[edge-1]"
            detailed = true

            [timeout]
            startup_timeout = "2m"

            [retry_on_failure]
            max_elapsed_time = "0s"

            [sending_queue]
            enabled = false

            [signals]
            metrics = false

            [logging]
            level = "telehouse=debug"
            ansi = false
            "#,
        )
        .unwrap();

        assert_eq!(config.clickhouse.database(), "telemetry");
        assert!(config.clickhouse.is_clustered());
        assert_eq!(
            config.clickhouse.connection_params.get("max_execution_time").map(String::as_str),
            Some("60")
        );
        assert_eq!(config.signals.enabled(), [SignalKind::Traces, SignalKind::Logs]);
        assert!(!config.logging.ansi);

        let settings = config.exporter_settings();
        assert_eq!(settings.output.prefix, "[edge-1]");
        assert!(settings.output.detailed);
        assert_eq!(settings.timeout.startup_timeout, Duration::from_secs(120));
        assert_eq!(settings.retry_on_failure.max_elapsed_time, Duration::ZERO);
        assert!(!settings.sending_queue.enabled);
    }

    #[test]
    fn password_is_not_in_debug_output() {
        let config = TelehouseConfig::from_toml(
            r#"
            [clickhouse]
            endpoint = "http://localhost:8123"
            password = "hunter2"
            "#,
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn unknown_value_types_are_rejected() {
        let err = TelehouseConfig::from_toml(
            r#"
            [signals]
            logs = "yes"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ServerError::Toml(_)));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("telehouse-{}.toml", uuid::Uuid::new_v4()));
        let (config, found) = TelehouseConfig::load(&path).unwrap();
        assert!(!found);
        assert!(config.clickhouse.is_log_only());
    }

    #[test]
    fn existing_file_is_read() {
        let path = std::env::temp_dir().join(format!("telehouse-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[signals]\ntraces = false\n").unwrap();
        let (config, found) = TelehouseConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(found);
        assert!(!config.signals.traces);
    }
}

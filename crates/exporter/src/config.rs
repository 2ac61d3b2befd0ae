use std::time::Duration;

use serde::Deserialize;

use telehouse_clickhouse::ClickHouseConfig;

/// Prefix stamped on every push log line when none is configured.
pub const DEFAULT_PREFIX: &str = "[telehouse]";

/// Everything one exporter instance needs, composed from named sub-records.
///
/// # Example
///
/// ```toml
/// [clickhouse]
/// endpoint = "http://localhost:8123"
///
/// [exporter]
/// prefix = "[edge-1]"
/// detailed = true
///
/// [timeout]
/// startup_timeout = "1m"
///
/// [retry_on_failure]
/// max_elapsed_time = "10m"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExporterSettings {
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,

    /// Push path output options.
    #[serde(default, rename = "exporter")]
    pub output: OutputConfig,

    #[serde(default)]
    pub timeout: TimeoutConfig,

    #[serde(default)]
    pub retry_on_failure: RetryConfig,

    #[serde(default)]
    pub sending_queue: QueueConfig,
}

/// How received batches are reported.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Prepended to every summary line.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Log one line per record in addition to the summary.
    #[serde(default)]
    pub detailed: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            detailed: false,
        }
    }
}

/// Deadlines for exports and for start-up.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Bound on a single export attempt.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Bound on the whole start sequence (schema provisioning and ping).
    #[serde(default = "default_startup_timeout", with = "humantime_serde")]
    pub startup_timeout: Duration,

    #[serde(default = "default_ping_timeout", with = "humantime_serde")]
    pub ping_timeout: Duration,

    /// Bound on each DDL statement.
    #[serde(default = "default_statement_timeout", with = "humantime_serde")]
    pub statement_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            startup_timeout: default_startup_timeout(),
            ping_timeout: default_ping_timeout(),
            statement_timeout: default_statement_timeout(),
        }
    }
}

/// Exponential back-off applied to failed exports.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before the first retry.
    #[serde(default = "default_initial_interval", with = "humantime_serde")]
    pub initial_interval: Duration,

    /// Upper bound on a single delay.
    #[serde(default = "default_max_interval", with = "humantime_serde")]
    pub max_interval: Duration,

    /// Give up once this much time has passed since the first attempt.
    /// Zero retries forever.
    #[serde(default = "default_max_elapsed_time", with = "humantime_serde")]
    pub max_elapsed_time: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval: default_initial_interval(),
            max_interval: default_max_interval(),
            max_elapsed_time: default_max_elapsed_time(),
            multiplier: default_multiplier(),
        }
    }
}

/// Bounded in-memory queue between the pipeline and the exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Worker tasks draining the queue.
    #[serde(default = "default_num_consumers")]
    pub num_consumers: usize,

    /// Batches buffered before senders are refused.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_consumers: default_num_consumers(),
            queue_size: default_queue_size(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_ping_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_statement_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_initial_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_max_elapsed_time() -> Duration {
    Duration::from_secs(300)
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_num_consumers() -> usize {
    10
}

fn default_queue_size() -> usize {
    1000
}

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use telehouse_core::MetricKind;

/// Database used when neither the configuration nor the endpoint names one.
pub const DEFAULT_DATABASE: &str = "default";

pub const DEFAULT_LOGS_TABLE: &str = "otel_logs";
pub const DEFAULT_TRACES_TABLE: &str = "otel_traces";
pub const DEFAULT_METRICS_TABLE: &str = "otel_metrics";

const SECONDS_PER_DAY: u64 = 86_400;

/// Connection target, credentials and schema policy for the `ClickHouse`
/// exporters.
///
/// An empty `endpoint` puts every exporter in log-only mode.
///
/// # Example
///
/// ```toml
/// [clickhouse]
/// endpoint = "https://clickhouse.internal:8443"
/// username = "otel"
/// password = "secret"
/// database = "telemetry"
/// ttl = "72h"
/// cluster_name = "main"
///
/// [clickhouse.connection_params]
/// max_execution_time = "60"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    /// Connection URI. The scheme selects the driver; `https` forces a
    /// secure transport. The bundled driver speaks the HTTP interface only,
    /// so `tcp://` and `clickhouse://` endpoints are rejected at open time
    /// and the exporter runs log-only.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub username: String,

    /// Never rendered in logs or error text.
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Logical database name. Empty falls back to the endpoint path, then
    /// to [`DEFAULT_DATABASE`].
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_logs_table")]
    pub logs_table_name: String,

    #[serde(default = "default_traces_table")]
    pub traces_table_name: String,

    /// Base name for metric tables; the point kind is appended
    /// (`otel_metrics_gauge`, `otel_metrics_sum`, ...).
    #[serde(default = "default_metrics_table")]
    pub metrics_table_name: String,

    /// Extra connection options merged into the connection string.
    #[serde(default)]
    pub connection_params: BTreeMap<String, String>,

    /// When `false`, no DDL is ever issued.
    #[serde(default = "default_true")]
    pub create_schema: bool,

    /// Compression hint, applied unless `connection_params` sets `compress`.
    #[serde(default = "default_compress")]
    pub compress: String,

    /// Async insert hint, applied unless `connection_params` sets `async_insert`.
    #[serde(default = "default_true")]
    pub async_insert: bool,

    /// Data retention. Zero disables the TTL clause.
    #[serde(default, with = "humantime_serde")]
    pub ttl: Duration,

    /// Retention in days, consulted only when `ttl` is zero.
    #[serde(default)]
    pub ttl_days: i64,

    /// Single-node table engine, e.g. `MergeTree` or `ReplicatedMergeTree('/path', '{replica}')`.
    #[serde(default = "default_table_engine")]
    pub table_engine: String,

    /// When set, DDL runs `ON CLUSTER` and tables use a `Distributed` engine.
    #[serde(default)]
    pub cluster_name: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            password: None,
            database: default_database(),
            logs_table_name: default_logs_table(),
            traces_table_name: default_traces_table(),
            metrics_table_name: default_metrics_table(),
            connection_params: BTreeMap::new(),
            create_schema: true,
            compress: default_compress(),
            async_insert: true,
            ttl: Duration::ZERO,
            ttl_days: 0,
            table_engine: default_table_engine(),
            cluster_name: String::new(),
        }
    }
}

impl ClickHouseConfig {
    /// Create a configuration for the given endpoint with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the database name.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: &str) -> Self {
        self.username = username.into();
        self.password = Some(SecretString::new(password.to_owned()));
        self
    }

    /// Set the cluster name.
    #[must_use]
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster_name = cluster.into();
        self
    }

    /// Set the retention duration.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// `true` when no endpoint is configured.
    pub fn is_log_only(&self) -> bool {
        self.endpoint.trim().is_empty()
    }

    /// Effective database name: the configured name, else the endpoint's
    /// path segment, else [`DEFAULT_DATABASE`].
    pub fn database(&self) -> String {
        if !self.database.is_empty() {
            return self.database.clone();
        }
        url::Url::parse(&self.endpoint)
            .ok()
            .map(|u| u.path().trim_matches('/').to_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned())
    }

    /// `false` turns every provisioning pass into a no-op.
    pub fn should_create_schema(&self) -> bool {
        self.create_schema
    }

    pub fn logs_table(&self) -> &str {
        non_empty_or(&self.logs_table_name, DEFAULT_LOGS_TABLE)
    }

    pub fn traces_table(&self) -> &str {
        non_empty_or(&self.traces_table_name, DEFAULT_TRACES_TABLE)
    }

    /// Table name for one metric point kind.
    pub fn metrics_table(&self, kind: MetricKind) -> String {
        let base = non_empty_or(&self.metrics_table_name, DEFAULT_METRICS_TABLE);
        format!("{base}_{kind}")
    }

    /// Effective retention. `ttl` wins over `ttl_days`; non-positive values
    /// disable retention.
    pub fn retention(&self) -> Duration {
        if !self.ttl.is_zero() {
            return self.ttl;
        }
        u64::try_from(self.ttl_days)
            .ok()
            .filter(|days| *days > 0)
            .map_or(Duration::ZERO, |days| {
                Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY))
            })
    }

    pub fn is_clustered(&self) -> bool {
        !self.cluster_name.is_empty()
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

fn default_database() -> String {
    "otel".to_owned()
}

fn default_logs_table() -> String {
    DEFAULT_LOGS_TABLE.to_owned()
}

fn default_traces_table() -> String {
    DEFAULT_TRACES_TABLE.to_owned()
}

fn default_metrics_table() -> String {
    DEFAULT_METRICS_TABLE.to_owned()
}

fn default_compress() -> String {
    "lz4".to_owned()
}

fn default_table_engine() -> String {
    "MergeTree".to_owned()
}

fn default_true() -> bool {
    true
}

//! Minimal telemetry batch shapes.
//!
//! Batches are nested resource → scope → record collections, mirroring how a
//! collector pipeline hands decoded telemetry to an exporter. Only the fields
//! the exporters log are modelled.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::MetricKind;

/// Free-form key/value attributes attached to resources, scopes and records.
pub type AttributeMap = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

/// A batch of log records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsData {
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLogs {
    #[serde(default)]
    pub resource: AttributeMap,
    #[serde(default)]
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeLogs {
    #[serde(default)]
    pub scope_name: String,
    #[serde(default)]
    pub scope_version: String,
    #[serde(default)]
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub severity_text: String,
    #[serde(default)]
    pub body: String,
    /// Hex-encoded trace id, empty when the record is not correlated.
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl LogsData {
    /// Total number of log records across all resources and scopes.
    pub fn record_count(&self) -> usize {
        self.resource_logs
            .iter()
            .flat_map(|rl| &rl.scope_logs)
            .map(|sl| sl.log_records.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Traces
// ---------------------------------------------------------------------------

/// A batch of spans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracesData {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSpans {
    #[serde(default)]
    pub resource: AttributeMap,
    #[serde(default)]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeSpans {
    #[serde(default)]
    pub scope_name: String,
    #[serde(default)]
    pub scope_version: String,
    #[serde(default)]
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: String,
    pub name: String,
    /// Span kind as reported by the SDK (`server`, `client`, ...).
    #[serde(default)]
    pub kind: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl Span {
    /// Wall-clock duration of the span. Negative durations clamp to zero.
    pub fn duration(&self) -> std::time::Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }
}

impl TracesData {
    /// Total number of spans across all resources and scopes.
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| &rs.scope_spans)
            .map(|ss| ss.spans.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// A batch of metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsData {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMetrics {
    #[serde(default)]
    pub resource: AttributeMap,
    #[serde(default)]
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeMetrics {
    #[serde(default)]
    pub scope_name: String,
    #[serde(default)]
    pub scope_version: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    pub points: MetricPoints,
}

/// Data points of a metric, tagged with the point kind they belong to.
///
/// Point payloads are not modelled; only their count is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPoints {
    pub kind: MetricKind,
    pub count: usize,
}

impl MetricsData {
    /// Total number of metrics across all resources and scopes.
    pub fn metric_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|rm| &rm.scope_metrics)
            .map(|sm| sm.metrics.len())
            .sum()
    }

    /// Total number of data points, broken down by point kind.
    pub fn points_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut out = BTreeMap::new();
        for metric in self
            .resource_metrics
            .iter()
            .flat_map(|rm| &rm.scope_metrics)
            .flat_map(|sm| &sm.metrics)
        {
            *out.entry(metric.points.kind.as_str()).or_insert(0) += metric.points.count;
        }
        out
    }
}

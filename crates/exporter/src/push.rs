//! Log-only push path.
//!
//! Received batches are summarized with `tracing`; with `detailed` set,
//! every record gets its own line as well. Nothing is inserted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use telehouse_core::{LogsData, MetricsData, SignalKind, TracesData};

use crate::config::OutputConfig;
use crate::error::ExportError;
use crate::queue::Consumer;

/// Counts reported for one pushed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushSummary {
    pub resources: usize,
    pub records: usize,
    pub db_connected: bool,
}

/// Writes push summaries for one exporter.
///
/// Clones share the connected flag, so a sink handed to a sending queue
/// reflects the owning exporter's connection state.
#[derive(Debug, Clone)]
pub struct LogSink {
    signal: SignalKind,
    prefix: String,
    detailed: bool,
    db_connected: Arc<AtomicBool>,
}

impl LogSink {
    pub fn new(signal: SignalKind, output: &OutputConfig) -> Self {
        Self {
            signal,
            prefix: output.prefix.clone(),
            detailed: output.detailed,
            db_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn signal(&self) -> SignalKind {
        self.signal
    }

    pub fn is_connected(&self) -> bool {
        self.db_connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.db_connected.store(connected, Ordering::Release);
    }

    pub fn push_logs(&self, data: &LogsData) -> PushSummary {
        let summary = PushSummary {
            resources: data.resource_logs.len(),
            records: data.record_count(),
            db_connected: self.is_connected(),
        };
        info!(
            prefix = %self.prefix,
            signal = %self.signal,
            resource_logs = summary.resources,
            total_logs = summary.records,
            db_connected = summary.db_connected,
            "received logs"
        );

        if self.detailed {
            for record in data
                .resource_logs
                .iter()
                .flat_map(|rl| &rl.scope_logs)
                .flat_map(|sl| &sl.log_records)
            {
                info!(
                    prefix = %self.prefix,
                    severity = %record.severity_text,
                    body = %record.body,
                    timestamp = %record.timestamp,
                    "log record"
                );
            }
        }
        summary
    }

    pub fn push_traces(&self, data: &TracesData) -> PushSummary {
        let summary = PushSummary {
            resources: data.resource_spans.len(),
            records: data.span_count(),
            db_connected: self.is_connected(),
        };
        info!(
            prefix = %self.prefix,
            signal = %self.signal,
            resource_spans = summary.resources,
            total_spans = summary.records,
            db_connected = summary.db_connected,
            "received traces"
        );

        if self.detailed {
            for span in data
                .resource_spans
                .iter()
                .flat_map(|rs| &rs.scope_spans)
                .flat_map(|ss| &ss.spans)
            {
                info!(
                    prefix = %self.prefix,
                    trace_id = %span.trace_id,
                    span_id = %span.span_id,
                    name = %span.name,
                    kind = %span.kind,
                    duration = ?span.duration(),
                    "span"
                );
            }
        }
        summary
    }

    pub fn push_metrics(&self, data: &MetricsData) -> PushSummary {
        let summary = PushSummary {
            resources: data.resource_metrics.len(),
            records: data.metric_count(),
            db_connected: self.is_connected(),
        };
        info!(
            prefix = %self.prefix,
            signal = %self.signal,
            resource_metrics = summary.resources,
            total_metrics = summary.records,
            points = ?data.points_by_kind(),
            db_connected = summary.db_connected,
            "received metrics"
        );

        if self.detailed {
            for metric in data
                .resource_metrics
                .iter()
                .flat_map(|rm| &rm.scope_metrics)
                .flat_map(|sm| &sm.metrics)
            {
                info!(
                    prefix = %self.prefix,
                    name = %metric.name,
                    description = %metric.description,
                    unit = %metric.unit,
                    kind = %metric.points.kind,
                    points = metric.points.count,
                    "metric"
                );
            }
        }
        summary
    }
}

#[async_trait]
impl Consumer<LogsData> for LogSink {
    async fn consume(&self, batch: &LogsData) -> Result<(), ExportError> {
        self.push_logs(batch);
        Ok(())
    }
}

#[async_trait]
impl Consumer<TracesData> for LogSink {
    async fn consume(&self, batch: &TracesData) -> Result<(), ExportError> {
        self.push_traces(batch);
        Ok(())
    }
}

#[async_trait]
impl Consumer<MetricsData> for LogSink {
    async fn consume(&self, batch: &MetricsData) -> Result<(), ExportError> {
        self.push_metrics(batch);
        Ok(())
    }
}

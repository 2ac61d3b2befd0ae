pub mod signal;
pub mod telemetry;

pub use signal::{MetricKind, SignalKind};
pub use telemetry::{
    AttributeMap, LogRecord, LogsData, Metric, MetricPoints, MetricsData, ResourceLogs,
    ResourceMetrics, ResourceSpans, ScopeLogs, ScopeMetrics, ScopeSpans, Span, TracesData,
};

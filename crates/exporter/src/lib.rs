//! Per-signal exporters for `ClickHouse`.
//!
//! An [`Exporter`] owns one connection, provisions its signal's tables on
//! [`Exporter::start`] and logs a summary of every pushed batch. Without a
//! reachable endpoint it degrades to log-only mode. [`SendingQueue`] sits
//! between the pipeline and the exporter's [`LogSink`], retrying transient
//! failures per [`RetryPolicy`].

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod push;
pub mod queue;
pub mod retry;

pub use config::{ExporterSettings, OutputConfig, QueueConfig, RetryConfig, TimeoutConfig};
pub use error::{ExportError, StartError};
pub use lifecycle::{Exporter, LifecycleState};
pub use push::{LogSink, PushSummary};
pub use queue::{Consumer, SendingQueue, export_with_retry};
pub use retry::{RetryPolicy, RetryStrategy};

//! One exporter per signal kind: connect, provision, serve, release.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use telehouse_clickhouse::{
    Connection, ConnectionManager, ProvisionReport, Provisioner, TemplateStore, build_dsn,
};
use telehouse_core::{LogsData, MetricsData, SignalKind, TracesData};

use crate::config::ExporterSettings;
use crate::error::{ExportError, StartError};
use crate::push::{LogSink, PushSummary};
use crate::queue::{Consumer, SendingQueue};
use crate::retry::RetryPolicy;

/// Where an exporter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Constructed => "constructed",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        })
    }
}

/// Exporter for a single signal kind.
///
/// Owns its connection exclusively; exporters for other signal kinds open
/// their own against the same target. Without a connection the exporter
/// runs in log-only mode.
pub struct Exporter {
    signal: SignalKind,
    settings: ExporterSettings,
    manager: ConnectionManager,
    templates: Arc<TemplateStore>,
    conn: Option<Box<dyn Connection>>,
    state: LifecycleState,
    sink: LogSink,
    last_report: Option<ProvisionReport>,
}

impl Exporter {
    /// Build the exporter and, when an endpoint is configured, a lazy
    /// connection handle.
    ///
    /// Connection-string or driver failures are not fatal here: they are
    /// logged and the exporter falls back to log-only mode.
    pub fn new(signal: SignalKind, settings: ExporterSettings, manager: ConnectionManager) -> Self {
        let conn = if settings.clickhouse.is_log_only() {
            info!(signal = %signal, "no endpoint configured, running in log-only mode");
            None
        } else {
            match open_connection(&settings, &manager) {
                Ok(conn) => Some(conn),
                Err(e) => {
                    warn!(
                        signal = %signal,
                        error = %e,
                        "failed to create connection, running in log-only mode"
                    );
                    None
                }
            }
        };

        let sink = LogSink::new(signal, &settings.output);
        Self {
            signal,
            settings,
            manager,
            templates: Arc::new(TemplateStore::builtin()),
            conn,
            state: LifecycleState::Constructed,
            sink,
            last_report: None,
        }
    }

    /// Replace the bundled DDL templates.
    #[must_use]
    pub fn with_templates(mut self, templates: Arc<TemplateStore>) -> Self {
        self.templates = templates;
        self
    }

    pub fn signal(&self) -> SignalKind {
        self.signal
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn settings(&self) -> &ExporterSettings {
        &self.settings
    }

    pub fn is_log_only(&self) -> bool {
        self.conn.is_none()
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Report from the last successful start, if it provisioned anything.
    pub fn last_report(&self) -> Option<&ProvisionReport> {
        self.last_report.as_ref()
    }

    /// Provision the schema and verify the connection.
    ///
    /// The whole sequence is bounded by the start-up timeout. In log-only
    /// mode this succeeds immediately. A failed start may be retried; every
    /// step is idempotent.
    #[instrument(name = "exporter.start", skip_all, fields(signal = %self.signal))]
    pub async fn start(&mut self) -> Result<(), ExportError> {
        match self.state {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Constructed | LifecycleState::Failed => {}
            state => {
                return Err(ExportError::InvalidState {
                    signal: self.signal,
                    state,
                });
            }
        }
        self.state = LifecycleState::Starting;

        let Some(conn) = self.conn.as_deref() else {
            info!("log-only mode, nothing to provision");
            self.state = LifecycleState::Running;
            return Ok(());
        };

        let mut provisioner = Provisioner::new(
            self.settings.clickhouse.clone(),
            self.manager.clone(),
            Arc::clone(&self.templates),
        )
        .with_statement_timeout(self.settings.timeout.statement_timeout);

        let startup_timeout = self.settings.timeout.startup_timeout;
        let prepared = tokio::time::timeout(
            startup_timeout,
            prepare(
                &mut provisioner,
                &self.manager,
                conn,
                self.signal,
                &self.settings,
            ),
        )
        .await;
        let result = match prepared {
            Ok(result) => result,
            Err(_elapsed) => Err(StartError::Timeout(startup_timeout)),
        };

        match result {
            Ok(report) => {
                info!(
                    database = %report.database,
                    tables = report.tables.len(),
                    "exporter running"
                );
                self.last_report = Some(report);
                self.sink.set_connected(true);
                self.state = LifecycleState::Running;
                Ok(())
            }
            Err(source) => {
                error!(
                    error = %source,
                    provision_state = %provisioner.state(),
                    "exporter failed to start"
                );
                self.state = LifecycleState::Failed;
                Err(ExportError::Start {
                    signal: self.signal,
                    source,
                })
            }
        }
    }

    /// Release the connection. Close failures are logged, never returned.
    #[instrument(name = "exporter.shutdown", skip_all, fields(signal = %self.signal))]
    pub async fn shutdown(&mut self) {
        self.state = LifecycleState::ShuttingDown;
        if let Some(conn) = self.conn.take() {
            // The manager logs close failures.
            let _ = self.manager.close(conn).await;
        }
        self.sink.set_connected(false);
        self.state = LifecycleState::Stopped;
        info!("exporter stopped");
    }

    pub fn push_logs(&self, data: &LogsData) -> PushSummary {
        self.sink.push_logs(data)
    }

    pub fn push_traces(&self, data: &TracesData) -> PushSummary {
        self.sink.push_traces(data)
    }

    pub fn push_metrics(&self, data: &MetricsData) -> PushSummary {
        self.sink.push_metrics(data)
    }

    /// A sending queue feeding this exporter's sink, built from the
    /// `sending_queue`, `timeout` and `retry_on_failure` settings. `None`
    /// when the queue is disabled.
    ///
    /// Must be called within a Tokio runtime.
    pub fn sending_queue<B>(&self) -> Option<SendingQueue<B>>
    where
        B: Send + Sync + 'static,
        LogSink: Consumer<B>,
    {
        let queue = &self.settings.sending_queue;
        if !queue.enabled {
            return None;
        }
        let consumer: Arc<dyn Consumer<B>> = Arc::new(self.sink.clone());
        Some(SendingQueue::start(
            self.signal,
            queue,
            consumer,
            self.settings.timeout.timeout,
            RetryPolicy::from(&self.settings.retry_on_failure),
        ))
    }
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("signal", &self.signal)
            .field("state", &self.state)
            .field("log_only", &self.is_log_only())
            .finish_non_exhaustive()
    }
}

fn open_connection(
    settings: &ExporterSettings,
    manager: &ConnectionManager,
) -> Result<Box<dyn Connection>, StartError> {
    let dsn = build_dsn(&settings.clickhouse, None)?;
    Ok(manager.open(&dsn)?)
}

/// Provision `signal`'s schema, then ping.
async fn prepare(
    provisioner: &mut Provisioner,
    manager: &ConnectionManager,
    conn: &dyn Connection,
    signal: SignalKind,
    settings: &ExporterSettings,
) -> Result<ProvisionReport, StartError> {
    let report = provisioner.provision(signal, conn).await?;
    manager.ping(conn, settings.timeout.ping_timeout).await?;
    Ok(report)
}

use tracing::{info, warn};

use telehouse_clickhouse::ConnectionManager;
use telehouse_exporter::Exporter;

use crate::config::TelehouseConfig;
use crate::error::ServerError;

/// One exporter per enabled signal, in start-up order.
pub fn create_exporters(config: &TelehouseConfig, manager: &ConnectionManager) -> Vec<Exporter> {
    let settings = config.exporter_settings();
    config
        .signals
        .enabled()
        .into_iter()
        .map(|signal| Exporter::new(signal, settings.clone(), manager.clone()))
        .collect()
}

/// Start `exporters` in order.
///
/// On the first failure, the exporters already started are shut down in
/// reverse order and the error is returned.
pub async fn start_exporters(exporters: &mut [Exporter]) -> Result<(), ServerError> {
    let mut failure = None;
    for (i, exporter) in exporters.iter_mut().enumerate() {
        match exporter.start().await {
            Ok(()) => info!(
                signal = %exporter.signal(),
                log_only = exporter.is_log_only(),
                "exporter started"
            ),
            Err(e) => {
                warn!(signal = %exporter.signal(), "aborting start-up");
                failure = Some((i, e));
                break;
            }
        }
    }

    match failure {
        Some((failed, e)) => {
            shutdown_exporters(&mut exporters[..=failed]).await;
            Err(e.into())
        }
        None => Ok(()),
    }
}

/// Shut down `exporters` in reverse start-up order.
pub async fn shutdown_exporters(exporters: &mut [Exporter]) {
    for exporter in exporters.iter_mut().rev() {
        exporter.shutdown().await;
    }
}

/// Start every enabled exporter once, then release them all.
///
/// Used by the `provision` subcommand. Log-only configuration is rejected
/// since there is nothing to provision.
pub async fn provision(
    config: &TelehouseConfig,
    manager: &ConnectionManager,
) -> Result<(), ServerError> {
    if config.clickhouse.is_log_only() {
        return Err(ServerError::Config(
            "provisioning requires [clickhouse] endpoint".into(),
        ));
    }

    let mut exporters = create_exporters(config, manager);
    if let Some(exporter) = exporters.iter().find(|e| e.is_log_only()) {
        return Err(ServerError::Config(format!(
            "{} exporter could not open a connection",
            exporter.signal()
        )));
    }

    start_exporters(&mut exporters).await?;
    for exporter in &exporters {
        if let Some(report) = exporter.last_report() {
            for table in &report.tables {
                info!(
                    signal = %report.signal,
                    database = %report.database,
                    table = %table.table,
                    "table ready"
                );
            }
        }
    }
    shutdown_exporters(&mut exporters).await;
    Ok(())
}

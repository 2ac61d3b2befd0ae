//! Configuration file to running exporters, end to end.

use std::sync::Arc;

use telehouse_clickhouse::testing::RecordingDriver;
use telehouse_clickhouse::{ConnectionManager, DriverRegistry, build_dsn};
use telehouse_core::{LogsData, SignalKind};
use telehouse_exporter::LifecycleState;
use telehouse_server::config::TelehouseConfig;
use telehouse_server::exporter_factory::{create_exporters, shutdown_exporters, start_exporters};

const CONFIG: &str = r#"
[clickhouse]
endpoint = "mem://ch.internal:8123"
username = "otel"
password = "s3cr3t"
database = "telemetry"
cluster_name = "main"
ttl = "24h"

[exporter]
prefix = "[it]"

[signals]
metrics = false
"#;

fn manager(driver: &RecordingDriver) -> ConnectionManager {
    let mut registry = DriverRegistry::new();
    registry.register("mem", Arc::new(driver.clone()));
    ConnectionManager::new(Arc::new(registry))
}

#[test]
fn printed_dsn_masks_the_password() {
    let config = TelehouseConfig::from_toml(CONFIG).unwrap();
    let dsn = build_dsn(&config.clickhouse, None).unwrap();
    let printed = dsn.to_string();
    assert!(printed.starts_with("mem://otel:"));
    assert!(!printed.contains("s3cr3t"));
    assert!(dsn.expose_secret().contains("s3cr3t"));
}

#[tokio::test]
async fn clustered_run_start_to_shutdown() {
    let config = TelehouseConfig::from_toml(CONFIG).unwrap();
    let driver = RecordingDriver::new();
    let mut exporters = create_exporters(&config, &manager(&driver));
    assert_eq!(exporters.len(), 2);

    start_exporters(&mut exporters).await.unwrap();

    let sql = driver.sql();
    assert!(
        sql.iter()
            .filter(|s| s.starts_with("CREATE DATABASE"))
            .all(|s| s.ends_with("ON CLUSTER 'main'"))
    );
    assert!(sql.iter().any(|s| s.contains("telemetry.otel_traces_local")));
    assert!(sql.iter().any(|s| s.contains("AS telemetry.otel_logs_local")));
    assert!(sql.iter().all(|s| !s.contains("otel_metrics")));

    let logs = exporters
        .iter()
        .find(|e| e.signal() == SignalKind::Logs)
        .unwrap();
    let queue = logs.sending_queue::<LogsData>().unwrap();
    queue.send(LogsData::default()).await.unwrap();
    queue.shutdown().await;
    assert!(logs.push_logs(&LogsData::default()).db_connected);

    shutdown_exporters(&mut exporters).await;
    assert!(exporters.iter().all(|e| e.state() == LifecycleState::Stopped));
    assert_eq!(driver.closed(), driver.opened());
}

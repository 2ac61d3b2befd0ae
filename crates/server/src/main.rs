use std::path::Path;

use clap::{Parser, Subcommand};
use tracing::info;

use telehouse_clickhouse::{ConnectionManager, build_dsn};
use telehouse_server::config::TelehouseConfig;
use telehouse_server::exporter_factory::{
    create_exporters, provision, shutdown_exporters, start_exporters,
};

/// Telehouse `ClickHouse` exporter runner.
#[derive(Parser, Debug)]
#[command(
    name = "telehouse-server",
    about = "Run the Telehouse ClickHouse exporters"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "telehouse.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and every enabled signal's tables, then exit.
    Provision,
    /// Print the connection string with the password masked.
    Dsn,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, found) = TelehouseConfig::load(Path::new(&cli.config))?;
    telehouse_server::telemetry::init(&config.logging);
    if !found {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let manager = ConnectionManager::default();

    match cli.command {
        Some(Commands::Dsn) => {
            let dsn = build_dsn(&config.clickhouse, None)?;
            println!("{dsn}");
            Ok(())
        }
        Some(Commands::Provision) => {
            provision(&config, &manager).await?;
            info!("provisioning complete");
            Ok(())
        }
        None => run(&config, &manager).await,
    }
}

async fn run(
    config: &TelehouseConfig,
    manager: &ConnectionManager,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut exporters = create_exporters(config, manager);
    if exporters.is_empty() {
        return Err("every signal is disabled in [signals]".into());
    }

    start_exporters(&mut exporters).await?;
    info!(exporters = exporters.len(), "telehouse-server running");

    shutdown_signal().await;

    shutdown_exporters(&mut exporters).await;
    info!("telehouse-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}

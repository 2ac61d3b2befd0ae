pub mod config;
pub mod error;
pub mod exporter_factory;
pub mod telemetry;

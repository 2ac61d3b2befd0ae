use thiserror::Error;

use telehouse_clickhouse::ConfigError;
use telehouse_exporter::ExportError;

/// Errors that can occur when running the Telehouse server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error not covered by a more specific variant.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// The connection string could not be built.
    #[error(transparent)]
    Dsn(#[from] ConfigError),

    /// An exporter failed to start.
    #[error(transparent)]
    Export(#[from] ExportError),
}

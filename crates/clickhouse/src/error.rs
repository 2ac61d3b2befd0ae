use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning configuration into a connection string.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No endpoint is configured. Callers treat this as log-only mode.
    #[error("endpoint must be specified")]
    MissingEndpoint,

    /// The endpoint could not be parsed as an absolute URI with a host.
    #[error("invalid endpoint format: {0}")]
    InvalidEndpoint(String),
}

/// Errors from opening, probing, using or closing a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No driver is registered for the connection string's scheme.
    #[error("no driver registered for scheme '{scheme}' (supported: {supported})")]
    UnsupportedScheme { scheme: String, supported: String },

    /// A connection option has a value the driver cannot honour.
    #[error("invalid connection option {key}={value}")]
    InvalidOption { key: String, value: String },

    /// The driver could not construct a handle.
    #[error("failed to open connection: {0}")]
    Open(String),

    /// A statement or liveness probe failed on the server side.
    #[error("query failed: {0}")]
    Query(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The handle was already released.
    #[error("connection is closed")]
    Closed,
}

/// Errors from loading or rendering DDL templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("sql template '{0}' not found")]
    NotFound(String),

    /// The number of substitution values does not match the placeholders.
    #[error("sql template '{template}' has {expected} placeholders but {found} values were supplied")]
    PlaceholderMismatch {
        template: String,
        expected: usize,
        found: usize,
    },
}

/// Errors from a schema provisioning pass.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A control connection for database creation could not be opened.
    #[error("control connection failed: {0}")]
    Connection(#[from] ConnectionError),

    /// `CREATE DATABASE` failed.
    #[error("failed to create database '{database}': {source}")]
    Database {
        database: String,
        #[source]
        source: ConnectionError,
    },

    /// `CREATE TABLE` failed; remaining tables were not attempted.
    #[error("failed to create table '{table}': {source}")]
    Table {
        table: String,
        #[source]
        source: ConnectionError,
    },

    /// The whole pass exceeded its deadline.
    #[error("schema provisioning timed out after {0:?}")]
    Timeout(Duration),
}

use std::time::Duration;

use thiserror::Error;

use telehouse_clickhouse::{ConfigError, ConnectionError, SchemaError};
use telehouse_core::SignalKind;

use crate::lifecycle::LifecycleState;

/// Why an exporter could not reach `Running`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The liveness probe after provisioning failed.
    #[error("connection check failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Provisioning and ping together exceeded the start-up deadline.
    #[error("start-up exceeded {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by an exporter or its sending queue.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{signal} exporter failed to start: {source}")]
    Start {
        signal: SignalKind,
        #[source]
        source: StartError,
    },

    /// `start` was called in a state it cannot leave.
    #[error("{signal} exporter cannot start from state {state}")]
    InvalidState {
        signal: SignalKind,
        state: LifecycleState,
    },

    /// A single export attempt exceeded its deadline.
    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    /// The consumer rejected a batch. Permanent rejections are never retried.
    #[error("export rejected: {message}")]
    Consumer { message: String, permanent: bool },

    #[error("sending queue is closed")]
    QueueClosed,

    #[error("sending queue is full")]
    QueueFull,
}

impl ExportError {
    /// Whether retrying the same batch can never succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Consumer { permanent, .. } => *permanent,
            Self::Start { .. } | Self::InvalidState { .. } | Self::QueueClosed => true,
            Self::Timeout(_) | Self::QueueFull => false,
        }
    }
}

//! Driver registry and connection management.
//!
//! Drivers are looked up by URI scheme in an explicit [`DriverRegistry`]
//! handed to the [`ConnectionManager`]; there is no process-wide driver
//! table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::driver::ClickHouseDriver;
use crate::dsn::Dsn;
use crate::error::ConnectionError;

/// Liveness probe timeout used when the caller does not supply one.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// An open handle to the target store.
///
/// Opening a handle performs no network I/O; reachability is only known
/// after [`Connection::ping`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement, discarding any result rows.
    async fn execute(&self, sql: &str) -> Result<(), ConnectionError>;

    /// Round-trip a trivial statement to prove the server is reachable.
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// Release the underlying session resources.
    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Builds connections for one or more URI schemes.
pub trait Driver: Send + Sync {
    /// Construct a lazy handle for `dsn`.
    fn open(&self, dsn: &Dsn) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Scheme → driver table.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `ClickHouse` HTTP driver bound to `http` and
    /// `https`.
    pub fn with_defaults() -> Self {
        let driver: Arc<dyn Driver> = Arc::new(ClickHouseDriver);
        let mut registry = Self::new();
        registry.register("http", Arc::clone(&driver));
        registry.register("https", driver);
        registry
    }

    /// Bind `scheme` to `driver`, replacing any previous binding.
    pub fn register(&mut self, scheme: impl Into<String>, driver: Arc<dyn Driver>) {
        self.drivers.insert(scheme.into().to_ascii_lowercase(), driver);
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn Driver>> {
        self.drivers.get(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Opens, probes and closes connections through a [`DriverRegistry`].
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    registry: Arc<DriverRegistry>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Construct a lazy handle for `dsn`. No network I/O is performed.
    pub fn open(&self, dsn: &Dsn) -> Result<Box<dyn Connection>, ConnectionError> {
        let Some(driver) = self.registry.get(dsn.scheme()) else {
            let supported = self.registry.schemes().join(", ");
            warn!(
                scheme = dsn.scheme(),
                supported = %supported,
                "no driver registered for endpoint scheme"
            );
            return Err(ConnectionError::UnsupportedScheme {
                scheme: dsn.scheme().to_owned(),
                supported,
            });
        };
        debug!(dsn = %dsn, "opening connection");
        driver.open(dsn)
    }

    /// Probe liveness, bounded by `timeout`.
    pub async fn ping(
        &self,
        conn: &dyn Connection,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        match tokio::time::timeout(timeout, conn.ping()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ConnectionError::Timeout(timeout)),
        }
    }

    /// Release `conn`. Failures are logged and returned; callers on a
    /// shutdown path ignore them.
    pub async fn close(&self, conn: Box<dyn Connection>) -> Result<(), ConnectionError> {
        let result = conn.close().await;
        if let Err(e) = &result {
            warn!(error = %e, "failed to close connection");
        }
        result
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Arc::new(DriverRegistry::with_defaults()))
    }
}

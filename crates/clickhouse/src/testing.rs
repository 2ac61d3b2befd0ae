//! Test support: an in-memory recording driver and a connection
//! conformance suite.
//!
//! [`RecordingDriver`] never touches the network. Every statement executed
//! through one of its connections is recorded together with the database
//! the connection was opened against, and failures can be injected per
//! statement, on ping, on open and on close.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::{Connection, Driver};
use crate::dsn::Dsn;
use crate::error::ConnectionError;

/// A statement observed by a [`RecordingDriver`] connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    /// Database selected by the connection string.
    pub database: String,
    pub sql: String,
}

#[derive(Debug, Default)]
struct Journal {
    statements: Mutex<Vec<RecordedStatement>>,
    opened: AtomicUsize,
    pings: AtomicUsize,
    closed: AtomicUsize,
}

impl Journal {
    fn push(&self, statement: RecordedStatement) {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement);
    }
}

/// Driver whose connections record statements instead of sending them.
///
/// Clones share the same journal, so a test can keep one clone and hand
/// another to a [`crate::DriverRegistry`].
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    journal: Arc<Journal>,
    fail_on: Option<String>,
    ping_delay: Option<Duration>,
    execute_delay: Option<Duration>,
    fail_open: bool,
    fail_ping: bool,
    fail_close: bool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement containing `needle`.
    #[must_use]
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    /// Delay every ping by `delay`.
    #[must_use]
    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = Some(delay);
        self
    }

    /// Delay every statement by `delay`.
    #[must_use]
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    #[must_use]
    pub fn fail_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    #[must_use]
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.journal
            .statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// SQL text of every statement executed so far, in order.
    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    pub fn opened(&self) -> usize {
        self.journal.opened.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.journal.pings.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.journal.closed.load(Ordering::SeqCst)
    }
}

impl Driver for RecordingDriver {
    fn open(&self, dsn: &Dsn) -> Result<Box<dyn Connection>, ConnectionError> {
        if self.fail_open {
            return Err(ConnectionError::Open("injected open failure".to_owned()));
        }
        self.journal.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingConnection {
            driver: self.clone(),
            database: dsn.database().to_owned(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct RecordingConnection {
    driver: RecordingDriver,
    database: String,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn execute(&self, sql: &str) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        if let Some(delay) = self.driver.execute_delay {
            tokio::time::sleep(delay).await;
        }
        self.driver.journal.push(RecordedStatement {
            database: self.database.clone(),
            sql: sql.to_owned(),
        });
        match &self.driver.fail_on {
            Some(needle) if sql.contains(needle.as_str()) => Err(ConnectionError::Query(format!(
                "injected failure for statement containing '{needle}'"
            ))),
            _ => Ok(()),
        }
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        if let Some(delay) = self.driver.ping_delay {
            tokio::time::sleep(delay).await;
        }
        self.driver.journal.pings.fetch_add(1, Ordering::SeqCst);
        if self.driver.fail_ping {
            return Err(ConnectionError::Query("injected ping failure".to_owned()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.driver.journal.closed.fetch_add(1, Ordering::SeqCst);
        if self.driver.fail_close {
            return Err(ConnectionError::Query("injected close failure".to_owned()));
        }
        Ok(())
    }
}

/// Run the connection conformance suite against a freshly opened, live
/// connection. The connection is closed on success.
///
/// # Errors
///
/// Returns the first connection error encountered.
pub async fn run_connection_conformance_tests(
    conn: &dyn Connection,
) -> Result<(), ConnectionError> {
    conn.ping().await?;
    conn.execute("SELECT 1").await?;
    // Pings are repeatable.
    conn.ping().await?;
    conn.close().await?;
    assert!(
        conn.execute("SELECT 1").await.is_err(),
        "execute after close should fail"
    );
    Ok(())
}

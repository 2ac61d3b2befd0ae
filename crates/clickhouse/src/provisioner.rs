//! Idempotent schema provisioning.
//!
//! A pass runs `Idle → DatabaseEnsured → TablesEnsured(n/total) → Ready`,
//! or ends in `Failed` on the first error. Every statement uses
//! `IF NOT EXISTS`, so concurrent passes from other signal kinds or replicas
//! converge in the store's DDL layer without any in-process locking.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use telehouse_core::SignalKind;

use crate::clause::{cluster_clause, quote_identifier};
use crate::config::{ClickHouseConfig, DEFAULT_DATABASE};
use crate::connection::{Connection, ConnectionManager};
use crate::dsn::build_dsn;
use crate::error::{ConnectionError, SchemaError};
use crate::schema::{Statement, table_specs};
use crate::template::TemplateStore;

/// Bound applied to each DDL statement when the caller does not supply one.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Progress of the current (or last) provisioning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Idle,
    DatabaseEnsured,
    TablesEnsured { done: usize, total: usize },
    Ready,
    Failed,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::DatabaseEnsured => f.write_str("database_ensured"),
            Self::TablesEnsured { done, total } => write!(f, "tables_ensured({done}/{total})"),
            Self::Ready => f.write_str("ready"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// What happened to the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseOutcome {
    /// `create_schema` is off.
    Disabled,
    /// The target is the server's default database, which always exists.
    DefaultDatabase,
    Ensured,
}

/// One table ensured during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub table: String,
    pub template: &'static str,
}

/// Summary of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub signal: SignalKind,
    pub database: String,
    pub database_outcome: DatabaseOutcome,
    pub tables: Vec<TableOutcome>,
}

impl ProvisionReport {
    /// `true` when no DDL was issued.
    pub fn is_noop(&self) -> bool {
        self.database_outcome != DatabaseOutcome::Ensured && self.tables.is_empty()
    }
}

/// Creates the database and the tables a signal kind writes to.
#[derive(Debug, Clone)]
pub struct Provisioner {
    config: ClickHouseConfig,
    manager: ConnectionManager,
    templates: Arc<TemplateStore>,
    statement_timeout: Duration,
    state: ProvisionState,
}

impl Provisioner {
    pub fn new(
        config: ClickHouseConfig,
        manager: ConnectionManager,
        templates: Arc<TemplateStore>,
    ) -> Self {
        Self {
            config,
            manager,
            templates,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            state: ProvisionState::Idle,
        }
    }

    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Run a full pass for `signal`, creating tables through `conn`.
    ///
    /// Template errors are detected before any table DDL is sent. The first
    /// failing statement aborts the pass; remaining tables are skipped.
    #[instrument(name = "schema.provision", skip_all, fields(signal = %signal))]
    pub async fn provision(
        &mut self,
        signal: SignalKind,
        conn: &dyn Connection,
    ) -> Result<ProvisionReport, SchemaError> {
        self.transition(ProvisionState::Idle);
        let result = self.run(signal, conn).await;
        match &result {
            Ok(report) => {
                self.transition(ProvisionState::Ready);
                info!(
                    database = %report.database,
                    tables = report.tables.len(),
                    "schema ready"
                );
            }
            Err(e) => {
                self.transition(ProvisionState::Failed);
                warn!(error = %e, "schema provisioning failed");
            }
        }
        result
    }

    /// [`Provisioner::provision`] bounded by `timeout`.
    ///
    /// On expiry the pass is abandoned mid-way; rerunning it is safe.
    pub async fn provision_within(
        &mut self,
        signal: SignalKind,
        conn: &dyn Connection,
        timeout: Duration,
    ) -> Result<ProvisionReport, SchemaError> {
        let outcome = tokio::time::timeout(timeout, self.provision(signal, conn)).await;
        match outcome {
            Ok(result) => result,
            Err(_elapsed) => {
                self.transition(ProvisionState::Failed);
                Err(SchemaError::Timeout(timeout))
            }
        }
    }

    async fn run(
        &mut self,
        signal: SignalKind,
        conn: &dyn Connection,
    ) -> Result<ProvisionReport, SchemaError> {
        let database = self.config.database();

        if !self.config.should_create_schema() {
            debug!("schema creation disabled");
            return Ok(ProvisionReport {
                signal,
                database,
                database_outcome: DatabaseOutcome::Disabled,
                tables: Vec::new(),
            });
        }

        let database_outcome = self.ensure_database().await?;
        self.transition(ProvisionState::DatabaseEnsured);

        let tables = self.ensure_tables(signal, conn).await?;

        Ok(ProvisionReport {
            signal,
            database,
            database_outcome,
            tables,
        })
    }

    /// Create the target database through a short-lived control connection
    /// scoped to `default`. The control connection is closed whatever the
    /// outcome.
    #[instrument(name = "schema.ensure_database", skip_all)]
    pub async fn ensure_database(&self) -> Result<DatabaseOutcome, SchemaError> {
        if !self.config.should_create_schema() {
            return Ok(DatabaseOutcome::Disabled);
        }
        let database = self.config.database();
        if database == DEFAULT_DATABASE {
            debug!("target is the default database, skipping creation");
            return Ok(DatabaseOutcome::DefaultDatabase);
        }

        let dsn = build_dsn(&self.config, Some(DEFAULT_DATABASE))?;
        let control = self.manager.open(&dsn)?;

        let sql = create_database_sql(&database, &cluster_clause(&self.config));
        let result = self.execute(control.as_ref(), &sql).await;
        if let Err(e) = self.manager.close(control).await {
            debug!(error = %e, "control connection close failed, continuing");
        }

        result.map_err(|source| SchemaError::Database {
            database: database.clone(),
            source,
        })?;
        info!(database = %database, "database ensured");
        Ok(DatabaseOutcome::Ensured)
    }

    /// Create every table `signal` needs, in order, through `conn`.
    #[instrument(name = "schema.ensure_tables", skip_all, fields(signal = %signal))]
    pub async fn ensure_tables(
        &mut self,
        signal: SignalKind,
        conn: &dyn Connection,
    ) -> Result<Vec<TableOutcome>, SchemaError> {
        let statements = self.render(signal)?;
        let total = statements.len();
        let mut outcomes = Vec::with_capacity(total);

        for (done, statement) in statements.into_iter().enumerate() {
            debug!(table = %statement.table, template = statement.template, "creating table");
            self.execute(conn, &statement.sql)
                .await
                .map_err(|source| SchemaError::Table {
                    table: statement.table.clone(),
                    source,
                })?;
            outcomes.push(TableOutcome {
                table: statement.table,
                template: statement.template,
            });
            self.transition(ProvisionState::TablesEnsured {
                done: done + 1,
                total,
            });
        }

        Ok(outcomes)
    }

    /// Render every statement `signal` needs without executing anything.
    pub fn render(&self, signal: SignalKind) -> Result<Vec<Statement>, SchemaError> {
        let mut statements = Vec::new();
        for spec in table_specs(&self.config, signal) {
            statements.extend(spec.statements(&self.templates)?);
        }
        Ok(statements)
    }

    async fn execute(&self, conn: &dyn Connection, sql: &str) -> Result<(), ConnectionError> {
        match tokio::time::timeout(self.statement_timeout, conn.execute(sql)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ConnectionError::Timeout(self.statement_timeout)),
        }
    }

    fn transition(&mut self, next: ProvisionState) {
        debug!(from = %self.state, to = %next, "provisioning state");
        self.state = next;
    }
}

fn create_database_sql(database: &str, cluster: &str) -> String {
    let database = quote_identifier(database);
    if cluster.is_empty() {
        format!("CREATE DATABASE IF NOT EXISTS {database}")
    } else {
        format!("CREATE DATABASE IF NOT EXISTS {database} {cluster}")
    }
}


#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;
    use crate::connection::DEFAULT_PING_TIMEOUT;
    use crate::testing::run_connection_conformance_tests;

    fn endpoint() -> String {
        std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string())
    }

    fn test_config() -> ClickHouseConfig {
        let mut config = ClickHouseConfig::new(endpoint())
            .with_database(format!("test_{}", uuid::Uuid::new_v4().simple()))
            .with_ttl(Duration::from_secs(72 * 3600));
        if let Ok(user) = std::env::var("CLICKHOUSE_USER") {
            let password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();
            config = config.with_credentials(user, &password);
        }
        config
    }

    #[tokio::test]
    async fn connection_conformance() {
        let config = test_config().with_database("default");
        let manager = ConnectionManager::default();
        let conn = manager
            .open(&build_dsn(&config, None).expect("dsn should build"))
            .expect("open should succeed");
        run_connection_conformance_tests(conn.as_ref())
            .await
            .expect("connection conformance tests should pass");
    }

    #[tokio::test]
    async fn provisions_every_signal_twice() {
        let config = test_config();
        let manager = ConnectionManager::default();
        let conn = manager
            .open(&build_dsn(&config, None).expect("dsn should build"))
            .expect("open should succeed");
        let mut provisioner =
            Provisioner::new(config.clone(), manager.clone(), Arc::new(TemplateStore::builtin()));

        for _ in 0..2 {
            for signal in SignalKind::ALL {
                provisioner
                    .provision(signal, conn.as_ref())
                    .await
                    .expect("provisioning should succeed");
            }
        }
        manager
            .ping(conn.as_ref(), DEFAULT_PING_TIMEOUT)
            .await
            .expect("ping should succeed");

        conn.execute(&format!(
            "DROP DATABASE IF EXISTS {}",
            quote_identifier(&config.database())
        ))
            .await
            .expect("cleanup should succeed");
    }
}

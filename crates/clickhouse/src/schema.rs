//! Per-signal table specifications.
//!
//! A [`TableSpec`] is recomputed on every provisioning pass; nothing here is
//! cached across runs.

use telehouse_core::{MetricKind, SignalKind};

use crate::clause::{
    cluster_clause, engine_clause, local_engine_clause, local_table_name, quote_identifier,
    ttl_clause,
};
use crate::config::ClickHouseConfig;
use crate::error::TemplateError;
use crate::template::{self, TemplateStore};

const LOGS_TTL_COLUMN: &str = "TimestampTime";
const TRACES_TTL_COLUMN: &str = "toDateTime(Timestamp)";
const METRICS_TTL_COLUMN: &str = "toDateTime(TimeUnix)";

/// Everything needed to render one table's DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub signal: SignalKind,
    pub template: &'static str,
    pub database: String,
    /// Logical table name that writers address.
    pub table: String,
    pub cluster: String,
    /// Engine of the table the template creates. Always single-node.
    pub engine: String,
    pub ttl: String,
    /// `Distributed` engine for the companion table, when clustered.
    pub distributed_engine: Option<String>,
}

/// A rendered DDL statement and the table it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub table: String,
    pub template: &'static str,
    pub sql: String,
}

impl TableSpec {
    fn new(
        config: &ClickHouseConfig,
        signal: SignalKind,
        template: &'static str,
        table: String,
        ttl_column: &str,
    ) -> Self {
        let distributed_engine = config
            .is_clustered()
            .then(|| engine_clause(config, &table));
        Self {
            signal,
            template,
            database: config.database(),
            cluster: cluster_clause(config),
            engine: local_engine_clause(config),
            ttl: ttl_clause(config, ttl_column),
            distributed_engine,
            table,
        }
    }

    /// Name of the table the template creates: `<table>_local` when
    /// clustered, else `table` itself.
    pub fn storage_table(&self) -> String {
        if self.distributed_engine.is_some() {
            local_table_name(&self.table)
        } else {
            self.table.clone()
        }
    }

    /// Render the statements for this table, storage table first.
    ///
    /// Database and table names are quoted as needed in the SQL; the
    /// returned [`Statement::table`] is the raw name.
    pub fn statements(&self, store: &TemplateStore) -> Result<Vec<Statement>, TemplateError> {
        let storage_table = self.storage_table();
        let database = quote_identifier(&self.database);
        let quoted_storage = quote_identifier(&storage_table);
        let sql = store.load(self.template)?.render(&[
            database.as_str(),
            quoted_storage.as_str(),
            self.cluster.as_str(),
            self.engine.as_str(),
            self.ttl.as_str(),
        ])?;
        let mut statements = vec![Statement {
            table: storage_table.clone(),
            template: self.template,
            sql,
        }];

        if let Some(engine) = &self.distributed_engine {
            let sql = store.load(template::DISTRIBUTED_TABLE)?.render(&[
                database.as_str(),
                quote_identifier(&self.table).as_str(),
                self.cluster.as_str(),
                database.as_str(),
                quoted_storage.as_str(),
                engine.as_str(),
            ])?;
            statements.push(Statement {
                table: self.table.clone(),
                template: template::DISTRIBUTED_TABLE,
                sql,
            });
        }

        Ok(statements)
    }
}

/// Tables required by `signal`, in creation order.
pub fn table_specs(config: &ClickHouseConfig, signal: SignalKind) -> Vec<TableSpec> {
    match signal {
        SignalKind::Logs => vec![TableSpec::new(
            config,
            signal,
            template::LOGS_TABLE,
            config.logs_table().to_owned(),
            LOGS_TTL_COLUMN,
        )],
        SignalKind::Traces => vec![TableSpec::new(
            config,
            signal,
            template::TRACES_TABLE,
            config.traces_table().to_owned(),
            TRACES_TTL_COLUMN,
        )],
        SignalKind::Metrics => MetricKind::ALL
            .into_iter()
            .map(|kind| {
                TableSpec::new(
                    config,
                    signal,
                    template::metrics_template(kind),
                    config.metrics_table(kind),
                    METRICS_TTL_COLUMN,
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> ClickHouseConfig {
        ClickHouseConfig::new("http://localhost:8123")
    }

    #[test]
    fn logs_and_traces_have_one_table() {
        let specs = table_specs(&config(), SignalKind::Logs);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].table, "otel_logs");
        assert_eq!(specs[0].template, template::LOGS_TABLE);

        let specs = table_specs(&config(), SignalKind::Traces);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].table, "otel_traces");
    }

    #[test]
    fn metrics_tables_in_fixed_order() {
        let tables: Vec<String> = table_specs(&config(), SignalKind::Metrics)
            .into_iter()
            .map(|s| s.table)
            .collect();
        assert_eq!(
            tables,
            [
                "otel_metrics_gauge",
                "otel_metrics_sum",
                "otel_metrics_histogram",
                "otel_metrics_exponential_histogram",
                "otel_metrics_summary",
            ]
        );
    }

    #[test]
    fn single_node_statement() {
        let cfg = config().with_ttl(Duration::from_secs(48 * 3600));
        let store = TemplateStore::builtin();
        let statements = table_specs(&cfg, SignalKind::Traces)[0]
            .statements(&store)
            .unwrap();

        assert_eq!(statements.len(), 1);
        let sql = &statements[0].sql;
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS otel.otel_traces  ("));
        assert!(sql.contains("ENGINE = MergeTree()"));
        assert!(sql.contains("TTL toDateTime(Timestamp) + toIntervalDay(2)"));
        assert!(!sql.contains("{}"));
    }

    #[test]
    fn clustered_statements_create_local_then_distributed() {
        let cfg = config().with_database("telemetry").with_cluster("c1");
        let store = TemplateStore::builtin();
        let spec = &table_specs(&cfg, SignalKind::Logs)[0];
        assert_eq!(spec.storage_table(), "otel_logs_local");

        let statements = spec.statements(&store).unwrap();
        assert_eq!(statements.len(), 2);

        assert_eq!(statements[0].table, "otel_logs_local");
        assert!(statements[0].sql.starts_with(
            "CREATE TABLE IF NOT EXISTS telemetry.otel_logs_local ON CLUSTER 'c1' ("
        ));
        assert!(statements[0].sql.contains("ENGINE = MergeTree()"));

        assert_eq!(statements[1].table, "otel_logs");
        assert_eq!(
            statements[1].sql.trim_end(),
            "CREATE TABLE IF NOT EXISTS telemetry.otel_logs ON CLUSTER 'c1'\n\
             AS telemetry.otel_logs_local\n\
             ENGINE = Distributed('c1', 'telemetry', 'otel_logs_local', rand())"
        );
    }

    #[test]
    fn unusual_names_are_quoted_in_sql_only() {
        let mut cfg = config().with_database("otel-prod").with_cluster("ops'east");
        cfg.logs_table_name = "logs.v2".into();
        let spec = &table_specs(&cfg, SignalKind::Logs)[0];
        let statements = spec.statements(&TemplateStore::builtin()).unwrap();

        assert_eq!(statements[0].table, "logs.v2_local");
        assert!(statements[0].sql.starts_with(
            r"CREATE TABLE IF NOT EXISTS `otel-prod`.`logs.v2_local` ON CLUSTER 'ops\'east' ("
        ));
        assert_eq!(statements[1].table, "logs.v2");
        assert_eq!(
            statements[1].sql.trim_end(),
            "CREATE TABLE IF NOT EXISTS `otel-prod`.`logs.v2` ON CLUSTER 'ops\\'east'\n\
             AS `otel-prod`.`logs.v2_local`\n\
             ENGINE = Distributed('ops\\'east', 'otel-prod', 'logs.v2_local', rand())"
        );
    }

    #[test]
    fn rendered_sql_has_no_placeholders() {
        let cfg = config().with_cluster("c1").with_ttl(Duration::from_secs(3600));
        let store = TemplateStore::builtin();
        for signal in SignalKind::ALL {
            for spec in table_specs(&cfg, signal) {
                for statement in spec.statements(&store).unwrap() {
                    assert!(!statement.sql.contains("{}"), "{}", statement.table);
                    assert!(statement.sql.contains("IF NOT EXISTS"));
                }
            }
        }
    }

    #[test]
    fn broken_template_is_reported() {
        let store = TemplateStore::from_templates([template::Template::new(
            template::LOGS_TABLE,
            "CREATE TABLE IF NOT EXISTS {}.{} {} ENGINE = {}",
        )]);
        let err = table_specs(&config(), SignalKind::Logs)[0]
            .statements(&store)
            .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::PlaceholderMismatch { expected: 4, found: 5, .. }
        ));
    }
}

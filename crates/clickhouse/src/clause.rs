//! DDL fragments derived from [`ClickHouseConfig`].
//!
//! Every function here is pure; the provisioner substitutes their output
//! into table templates.

use std::time::Duration;

use crate::config::ClickHouseConfig;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Suffix of the per-shard table behind a `Distributed` table.
pub const LOCAL_TABLE_SUFFIX: &str = "_local";

/// Backtick-quote `name` unless it is a plain identifier
/// (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn quote_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_owned()
    } else {
        format!("`{}`", escape(name, '`'))
    }
}

/// Render `value` as a single-quoted string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape(value, '\''))
}

fn escape(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `ON CLUSTER '<name>'`, or the empty string on a single node.
pub fn cluster_clause(config: &ClickHouseConfig) -> String {
    if config.is_clustered() {
        format!("ON CLUSTER {}", quote_literal(&config.cluster_name))
    } else {
        String::new()
    }
}

/// Engine for `table`.
///
/// Clustered deployments get a `Distributed` engine that shards writes
/// across `<table>_local` on every node; otherwise the single-node engine.
pub fn engine_clause(config: &ClickHouseConfig, table: &str) -> String {
    if config.is_clustered() {
        format!(
            "Distributed({}, {}, {}, rand())",
            quote_literal(&config.cluster_name),
            quote_literal(&config.database()),
            quote_literal(&local_table_name(table)),
        )
    } else {
        local_engine_clause(config)
    }
}

/// The single-node engine, with `()` appended when no parameter list is
/// given.
pub fn local_engine_clause(config: &ClickHouseConfig) -> String {
    let engine = config.table_engine.trim();
    if engine.is_empty() {
        "MergeTree()".to_owned()
    } else if engine.contains('(') {
        engine.to_owned()
    } else {
        format!("{engine}()")
    }
}

pub fn local_table_name(table: &str) -> String {
    format!("{table}{LOCAL_TABLE_SUFFIX}")
}

/// `TTL <column> + toInterval<Unit>(<n>)`, or the empty string when
/// retention is disabled.
pub fn ttl_clause(config: &ClickHouseConfig, column: &str) -> String {
    match ttl_interval(config.retention()) {
        Some(interval) => format!("TTL {column} + {interval}"),
        None => String::new(),
    }
}

/// Render a retention period in the largest unit that divides it evenly.
///
/// Sub-second remainders are truncated; anything shorter than one second
/// disables retention.
pub fn ttl_interval(ttl: Duration) -> Option<String> {
    let secs = ttl.as_secs();
    if secs == 0 {
        return None;
    }
    let interval = if secs % SECONDS_PER_DAY == 0 {
        format!("toIntervalDay({})", secs / SECONDS_PER_DAY)
    } else if secs % SECONDS_PER_HOUR == 0 {
        format!("toIntervalHour({})", secs / SECONDS_PER_HOUR)
    } else if secs % SECONDS_PER_MINUTE == 0 {
        format!("toIntervalMinute({})", secs / SECONDS_PER_MINUTE)
    } else {
        format!("toIntervalSecond({secs})")
    };
    Some(interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(n: u64) -> Duration {
        Duration::from_secs(n * 3600)
    }

    #[test]
    fn ttl_unit_selection() {
        assert_eq!(ttl_interval(hours(48)).as_deref(), Some("toIntervalDay(2)"));
        assert_eq!(ttl_interval(hours(36)).as_deref(), Some("toIntervalHour(36)"));
        assert_eq!(
            ttl_interval(Duration::from_secs(150 * 60)).as_deref(),
            Some("toIntervalMinute(150)")
        );
        assert_eq!(
            ttl_interval(Duration::from_secs(90)).as_deref(),
            Some("toIntervalSecond(90)")
        );
        assert_eq!(ttl_interval(Duration::ZERO), None);
        assert_eq!(ttl_interval(Duration::from_millis(500)), None);
    }

    #[test]
    fn whole_days_prefer_days_over_hours() {
        // 24h is divisible by an hour too; days still win.
        assert_eq!(ttl_interval(hours(24)).as_deref(), Some("toIntervalDay(1)"));
        assert_eq!(ttl_interval(hours(72)).as_deref(), Some("toIntervalDay(3)"));
    }

    #[test]
    fn ttl_clause_is_anchored_to_column() {
        let cfg = ClickHouseConfig::new("http://localhost:8123").with_ttl(hours(48));
        assert_eq!(
            ttl_clause(&cfg, "toDateTime(Timestamp)"),
            "TTL toDateTime(Timestamp) + toIntervalDay(2)"
        );

        let cfg = ClickHouseConfig::new("http://localhost:8123");
        assert_eq!(ttl_clause(&cfg, "toDateTime(Timestamp)"), "");
    }

    #[test]
    fn ttl_days_fallback() {
        let cfg = ClickHouseConfig {
            ttl_days: 7,
            ..ClickHouseConfig::default()
        };
        assert_eq!(ttl_clause(&cfg, "TimestampTime"), "TTL TimestampTime + toIntervalDay(7)");
    }

    #[test]
    fn single_node_clauses() {
        let cfg = ClickHouseConfig::new("http://localhost:8123");
        assert_eq!(cluster_clause(&cfg), "");
        assert_eq!(engine_clause(&cfg, "otel_logs"), "MergeTree()");
    }

    #[test]
    fn clustered_clauses() {
        let cfg = ClickHouseConfig::new("http://localhost:8123")
            .with_database("telemetry")
            .with_cluster("c1");
        assert_eq!(cluster_clause(&cfg), "ON CLUSTER 'c1'");
        assert_eq!(
            engine_clause(&cfg, "otel_logs"),
            "Distributed('c1', 'telemetry', 'otel_logs_local', rand())"
        );
        assert_eq!(local_engine_clause(&cfg), "MergeTree()");
    }

    #[test]
    fn identifiers_are_quoted_only_when_needed() {
        assert_eq!(quote_identifier("otel_logs"), "otel_logs");
        assert_eq!(quote_identifier("_tmp1"), "_tmp1");
        assert_eq!(quote_identifier("otel-prod"), "`otel-prod`");
        assert_eq!(quote_identifier("1st"), "`1st`");
        assert_eq!(quote_identifier("we`ird"), r"`we\`ird`");
        assert_eq!(quote_identifier(""), "``");
    }

    #[test]
    fn quotes_in_cluster_name_are_escaped() {
        let cfg = ClickHouseConfig::new("http://localhost:8123")
            .with_database("telemetry")
            .with_cluster("o'brien");
        assert_eq!(cluster_clause(&cfg), r"ON CLUSTER 'o\'brien'");
        assert_eq!(
            engine_clause(&cfg, "otel_logs"),
            r"Distributed('o\'brien', 'telemetry', 'otel_logs_local', rand())"
        );
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn engine_parameters_are_kept() {
        let mut cfg = ClickHouseConfig::new("http://localhost:8123");
        cfg.table_engine = "ReplicatedMergeTree('/clickhouse/{shard}/t', '{replica}')".into();
        assert_eq!(
            local_engine_clause(&cfg),
            "ReplicatedMergeTree('/clickhouse/{shard}/t', '{replica}')"
        );

        cfg.table_engine = "ReplacingMergeTree".into();
        assert_eq!(local_engine_clause(&cfg), "ReplacingMergeTree()");

        cfg.table_engine = String::new();
        assert_eq!(local_engine_clause(&cfg), "MergeTree()");
    }
}

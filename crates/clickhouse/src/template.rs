//! Bundled DDL templates.
//!
//! Table templates carry five positional `{}` placeholders consumed in
//! order: database, table, cluster clause, engine clause, TTL clause.

use std::collections::BTreeMap;

use telehouse_core::MetricKind;

use crate::error::TemplateError;

/// Positional placeholder marker.
pub const PLACEHOLDER: &str = "{}";

pub const LOGS_TABLE: &str = "logs_table";
pub const TRACES_TABLE: &str = "traces_table";
pub const METRICS_GAUGE_TABLE: &str = "metrics_gauge_table";
pub const METRICS_SUM_TABLE: &str = "metrics_sum_table";
pub const METRICS_HISTOGRAM_TABLE: &str = "metrics_histogram_table";
pub const METRICS_EXPONENTIAL_HISTOGRAM_TABLE: &str = "metrics_exponential_histogram_table";
pub const METRICS_SUMMARY_TABLE: &str = "metrics_summary_table";

/// `Distributed` companion for a `_local` table. Placeholders: database,
/// table, cluster clause, database, local table, engine clause.
pub const DISTRIBUTED_TABLE: &str = "distributed_table";

const BUILTIN: &[(&str, &str)] = &[
    (LOGS_TABLE, include_str!("../sql/logs_table.sql")),
    (TRACES_TABLE, include_str!("../sql/traces_table.sql")),
    (METRICS_GAUGE_TABLE, include_str!("../sql/metrics_gauge_table.sql")),
    (METRICS_SUM_TABLE, include_str!("../sql/metrics_sum_table.sql")),
    (
        METRICS_HISTOGRAM_TABLE,
        include_str!("../sql/metrics_histogram_table.sql"),
    ),
    (
        METRICS_EXPONENTIAL_HISTOGRAM_TABLE,
        include_str!("../sql/metrics_exponential_histogram_table.sql"),
    ),
    (
        METRICS_SUMMARY_TABLE,
        include_str!("../sql/metrics_summary_table.sql"),
    ),
    (DISTRIBUTED_TABLE, include_str!("../sql/distributed_table.sql")),
];

/// Template name for a metric point kind.
pub fn metrics_template(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Gauge => METRICS_GAUGE_TABLE,
        MetricKind::Sum => METRICS_SUM_TABLE,
        MetricKind::Histogram => METRICS_HISTOGRAM_TABLE,
        MetricKind::ExponentialHistogram => METRICS_EXPONENTIAL_HISTOGRAM_TABLE,
        MetricKind::Summary => METRICS_SUMMARY_TABLE,
    }
}

/// A named, immutable DDL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    text: String,
}

impl Template {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn placeholder_count(&self) -> usize {
        self.text.matches(PLACEHOLDER).count()
    }

    /// Substitute `values` left to right, one per placeholder.
    ///
    /// Substituted text is never re-scanned, so values may themselves
    /// contain `{}` (e.g. `ReplicatedMergeTree('/t/{shard}', '{replica}')`).
    pub fn render(&self, values: &[&str]) -> Result<String, TemplateError> {
        let expected = self.placeholder_count();
        if expected != values.len() {
            return Err(TemplateError::PlaceholderMismatch {
                template: self.name.clone(),
                expected,
                found: values.len(),
            });
        }

        let capacity = self.text.len() + values.iter().map(|v| v.len()).sum::<usize>();
        let mut rendered = String::with_capacity(capacity);
        let mut pieces = self.text.split(PLACEHOLDER);
        if let Some(head) = pieces.next() {
            rendered.push_str(head);
        }
        for (value, piece) in values.iter().zip(pieces) {
            rendered.push_str(value);
            rendered.push_str(piece);
        }
        Ok(rendered)
    }
}

/// Read-only set of templates addressed by name.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    /// Templates compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_templates(
            BUILTIN
                .iter()
                .map(|(name, text)| Template::new(*name, *text)),
        )
    }

    /// A store holding exactly `templates`. Later entries replace earlier
    /// ones with the same name.
    pub fn from_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
        }
    }

    pub fn load(&self, name: &str) -> Result<&Template, TemplateError> {
        self.templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names() {
        let store = TemplateStore::builtin();
        let names: Vec<&str> = store.names().collect();
        assert_eq!(
            names,
            [
                DISTRIBUTED_TABLE,
                LOGS_TABLE,
                METRICS_EXPONENTIAL_HISTOGRAM_TABLE,
                METRICS_GAUGE_TABLE,
                METRICS_HISTOGRAM_TABLE,
                METRICS_SUM_TABLE,
                METRICS_SUMMARY_TABLE,
                TRACES_TABLE,
            ]
        );
    }

    #[test]
    fn table_templates_take_five_values() {
        let store = TemplateStore::builtin();
        for name in store.names().filter(|n| *n != DISTRIBUTED_TABLE) {
            let template = store.load(name).unwrap();
            assert_eq!(template.placeholder_count(), 5, "{name}");
            assert!(template.text().starts_with("CREATE TABLE IF NOT EXISTS"));
        }
        assert_eq!(store.load(DISTRIBUTED_TABLE).unwrap().placeholder_count(), 6);
    }

    #[test]
    fn every_metric_kind_has_a_template() {
        let store = TemplateStore::builtin();
        for kind in MetricKind::ALL {
            assert!(store.load(metrics_template(kind)).is_ok(), "{kind}");
        }
    }

    #[test]
    fn missing_template() {
        let store = TemplateStore::builtin();
        let err = store.load("nope").unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(n) if n == "nope"));
    }

    #[test]
    fn renders_left_to_right() {
        let t = Template::new("t", "CREATE TABLE {}.{} {} ENGINE = {} {}");
        let sql = t
            .render(&["db", "tbl", "ON CLUSTER 'c'", "MergeTree()", ""])
            .unwrap();
        assert_eq!(sql, "CREATE TABLE db.tbl ON CLUSTER 'c' ENGINE = MergeTree() ");
    }

    #[test]
    fn values_are_not_rescanned() {
        let t = Template::new("t", "ENGINE = {} {}");
        let sql = t
            .render(&["ReplicatedMergeTree('/t/{shard}', '{}')", "TTL x"])
            .unwrap();
        assert_eq!(sql, "ENGINE = ReplicatedMergeTree('/t/{shard}', '{}') TTL x");
    }

    #[test]
    fn count_mismatch_fails() {
        let t = Template::new("four", "{} {} {} {}");
        let err = t.render(&["a", "b", "c", "d", "e"]).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::PlaceholderMismatch { template, expected: 4, found: 5 } if template == "four"
        ));

        assert!(t.render(&["a", "b", "c"]).is_err());
    }

    #[test]
    fn custom_store_overrides() {
        let store = TemplateStore::from_templates([
            Template::new(LOGS_TABLE, "first"),
            Template::new(LOGS_TABLE, "second"),
        ]);
        assert_eq!(store.load(LOGS_TABLE).unwrap().text(), "second");
        assert!(store.load(TRACES_TABLE).is_err());
    }
}

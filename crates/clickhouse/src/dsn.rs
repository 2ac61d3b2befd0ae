//! Connection-string construction.
//!
//! [`build_dsn`] is a pure function of the configuration: identical inputs
//! always produce a byte-identical URI, because query parameters are emitted
//! in sorted key order.

use std::collections::BTreeMap;
use std::fmt;

use secrecy::ExposeSecret;
use url::Url;

use crate::config::{ClickHouseConfig, DEFAULT_DATABASE};
use crate::error::ConfigError;

const REDACTED: &str = "xxxxx";

/// A connection URI that may carry credentials.
///
/// `Display` and `Debug` mask the password; [`Dsn::expose_secret`] is the
/// only way to read the raw string.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    url: Url,
    database: String,
}

impl Dsn {
    /// Parse an existing connection string.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = parse_endpoint(raw)?;
        let database = url.path().trim_matches('/').to_owned();
        Ok(Self { url, database })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Database selected by the path component.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The raw URI, password included.
    pub fn expose_secret(&self) -> &str {
        self.url.as_str()
    }

    /// The parsed URI, password included.
    pub fn expose_url(&self) -> &Url {
        &self.url
    }

    /// Look up a query parameter.
    pub fn param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// The URI with any password replaced by a fixed mask.
    pub fn redacted(&self) -> String {
        if self.url.password().is_none() {
            return self.url.to_string();
        }
        let mut masked = self.url.clone();
        // Setting a password only fails for URLs without a host, which
        // `parse_endpoint` already rejects.
        let _ = masked.set_password(Some(REDACTED));
        masked.to_string()
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dsn").field(&self.redacted()).finish()
    }
}

/// Build the connection string for `config`.
///
/// The database path is resolved in this order: `database_override`, the
/// configured `database`, the endpoint's own path, then `default`.
///
/// Query parameters start from the endpoint's query string, are overridden
/// by `connection_params`, and finally receive the forced values:
/// `secure=true` for `https` endpoints (always wins), and `compress` /
/// `async_insert` when not already present.
pub fn build_dsn(
    config: &ClickHouseConfig,
    database_override: Option<&str>,
) -> Result<Dsn, ConfigError> {
    if config.is_log_only() {
        return Err(ConfigError::MissingEndpoint);
    }

    let mut url = parse_endpoint(config.endpoint.trim())?;

    let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    for (key, value) in &config.connection_params {
        params.insert(key.clone(), value.clone());
    }
    if url.scheme() == "https" {
        params.insert("secure".to_owned(), "true".to_owned());
    }
    params
        .entry("compress".to_owned())
        .or_insert_with(|| compress_hint(&config.compress).to_owned());
    params
        .entry("async_insert".to_owned())
        .or_insert_with(|| config.async_insert.to_string());

    let endpoint_path = url.path().trim_matches('/').to_owned();
    let database = [
        database_override.unwrap_or_default(),
        config.database.as_str(),
        endpoint_path.as_str(),
    ]
    .into_iter()
    .find(|candidate| !candidate.is_empty())
    .unwrap_or(DEFAULT_DATABASE)
    .to_owned();
    url.set_path(&database);

    if !config.username.is_empty() {
        let password = config
            .password
            .as_ref()
            .map(|p| p.expose_secret().as_str());
        url.set_username(&config.username)
            .and_then(|()| url.set_password(password))
            .map_err(|()| {
                ConfigError::InvalidEndpoint("endpoint cannot carry credentials".to_owned())
            })?;
    }

    url.query_pairs_mut().clear().extend_pairs(&params);

    Ok(Dsn { url, database })
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEndpoint(e.to_string()))?;
    if url.cannot_be_a_base() || !url.has_host() {
        return Err(ConfigError::InvalidEndpoint(
            "endpoint must include a host".to_owned(),
        ));
    }
    Ok(url)
}

fn compress_hint(configured: &str) -> &str {
    match configured {
        "" | "true" => "lz4",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> ClickHouseConfig {
        ClickHouseConfig::new(endpoint)
    }

    #[test]
    fn missing_endpoint() {
        let err = build_dsn(&config(""), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint));
    }

    #[test]
    fn invalid_endpoint() {
        let err = build_dsn(&config("not a uri"), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));

        let err = build_dsn(&config("mailto:ops@example.com"), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn builds_default_query_parameters() {
        let dsn = build_dsn(&config("http://localhost:8123"), None).unwrap();
        assert_eq!(
            dsn.expose_secret(),
            "http://localhost:8123/otel?async_insert=true&compress=lz4"
        );
        assert_eq!(dsn.database(), "otel");
    }

    #[test]
    fn output_is_deterministic() {
        let mut cfg = config("https://ch:8443/?b=2&a=1").with_credentials("otel", "p@ss");
        cfg.connection_params.insert("zeta".into(), "z".into());
        cfg.connection_params.insert("alpha".into(), "a".into());
        cfg.connection_params.insert("mid".into(), "m".into());

        let first = build_dsn(&cfg, None).unwrap();
        for _ in 0..16 {
            let again = build_dsn(&cfg, None).unwrap();
            assert_eq!(first.expose_secret(), again.expose_secret());
        }
    }

    #[test]
    fn database_precedence() {
        // Override > configured database > endpoint path > default.
        let cfg = config("http://localhost:8123/from_path").with_database("configured");
        let dsn = build_dsn(&cfg, Some("override")).unwrap();
        assert_eq!(dsn.database(), "override");

        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.database(), "configured");

        let cfg = config("http://localhost:8123/from_path").with_database("");
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.database(), "from_path");

        let cfg = config("http://localhost:8123").with_database("");
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.database(), "default");
        assert!(dsn.expose_secret().starts_with("http://localhost:8123/default?"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let cfg = config("http://localhost:8123").with_database("configured");
        let dsn = build_dsn(&cfg, Some("")).unwrap();
        assert_eq!(dsn.database(), "configured");
    }

    #[test]
    fn connection_params_override_endpoint_query() {
        let mut cfg = config("http://localhost:8123?max_threads=2&readonly=0");
        cfg.connection_params.insert("max_threads".into(), "8".into());
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.param("max_threads").as_deref(), Some("8"));
        assert_eq!(dsn.param("readonly").as_deref(), Some("0"));
    }

    #[test]
    fn https_forces_secure_flag() {
        let mut cfg = config("https://ch:8443?secure=false");
        cfg.connection_params.insert("secure".into(), "false".into());
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.param("secure").as_deref(), Some("true"));

        let dsn = build_dsn(&config("http://ch:8123"), None).unwrap();
        assert_eq!(dsn.param("secure"), None);
    }

    #[test]
    fn compress_and_async_insert_respect_explicit_values() {
        let mut cfg = config("http://ch:8123?compress=none");
        cfg.async_insert = false;
        cfg.compress = "zstd".into();
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.param("compress").as_deref(), Some("none"));
        assert_eq!(dsn.param("async_insert").as_deref(), Some("false"));

        let dsn = build_dsn(&config("http://ch:8123"), None).unwrap();
        assert_eq!(dsn.param("compress").as_deref(), Some("lz4"));

        let mut cfg = config("http://ch:8123");
        cfg.compress = "true".into();
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.param("compress").as_deref(), Some("lz4"));

        let mut cfg = config("http://ch:8123");
        cfg.connection_params
            .insert("async_insert".into(), "1".into());
        cfg.async_insert = false;
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.param("async_insert").as_deref(), Some("1"));
    }

    #[test]
    fn credentials_only_when_username_set() {
        let dsn = build_dsn(&config("http://ch:8123"), None).unwrap();
        assert_eq!(dsn.expose_url().username(), "");

        let cfg = config("http://ch:8123").with_credentials("otel", "p@ss:word/");
        let dsn = build_dsn(&cfg, None).unwrap();
        assert_eq!(dsn.expose_url().username(), "otel");
        assert_eq!(dsn.expose_url().password(), Some("p%40ss%3Aword%2F"));
    }

    #[test]
    fn password_never_rendered() {
        let cfg = config("http://ch:8123").with_credentials("otel", "hunter2");
        let dsn = build_dsn(&cfg, None).unwrap();
        assert!(dsn.expose_secret().contains("hunter2"));
        assert!(!dsn.to_string().contains("hunter2"));
        assert!(!format!("{dsn:?}").contains("hunter2"));
        assert!(dsn.to_string().contains("otel:xxxxx@"));
    }

    #[test]
    fn parse_round_trips_built_dsn() {
        let cfg = config("http://ch:8123").with_credentials("otel", "secret");
        let built = build_dsn(&cfg, Some("analytics")).unwrap();
        let parsed = Dsn::parse(built.expose_secret()).unwrap();
        assert_eq!(parsed, built);
        assert_eq!(parsed.database(), "analytics");
    }
}

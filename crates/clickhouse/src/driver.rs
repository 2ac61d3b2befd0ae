//! `ClickHouse` HTTP driver.
//!
//! Maps a connection string onto a [`clickhouse::Client`]:
//!
//! - the path selects the database,
//! - user-info supplies credentials,
//! - `secure=true` upgrades an `http` endpoint to `https`,
//! - `compress` selects client compression; hints the HTTP client cannot
//!   honour (`zstd`, `gzip`, ...) fall back to no compression,
//! - every other parameter is forwarded as a `ClickHouse` setting, with
//!   `true`/`false` normalized to `1`/`0`.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use clickhouse::{Client, Compression};
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::connection::{Connection, Driver};
use crate::dsn::Dsn;
use crate::error::ConnectionError;

/// Statement used as the liveness probe.
const PING_QUERY: &str = "SELECT 1";

/// Driver for the `ClickHouse` HTTP interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseDriver;

impl Driver for ClickHouseDriver {
    fn open(&self, dsn: &Dsn) -> Result<Box<dyn Connection>, ConnectionError> {
        let client = client_from_dsn(dsn)?;
        Ok(Box::new(ClickHouseConnection {
            client,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Build a [`clickhouse::Client`] from a connection string.
pub fn client_from_dsn(dsn: &Dsn) -> Result<Client, ConnectionError> {
    let url = dsn.expose_url();
    let mut secure = url.scheme() == "https";
    let mut compression = Compression::None;
    let mut settings: Vec<(String, String)> = Vec::new();

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "secure" => secure |= parse_bool(&key, &value)?,
            "compress" => compression = parse_compression(&value),
            _ => settings.push((key.into_owned(), normalize_setting(&value).into_owned())),
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| ConnectionError::Open("connection string has no host".to_owned()))?;
    let scheme = if secure { "https" } else { "http" };
    let base = match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    };

    let mut client = Client::default()
        .with_url(base)
        .with_compression(compression);

    if !dsn.database().is_empty() {
        client = client.with_database(dsn.database());
    }
    if !url.username().is_empty() {
        client = client.with_user(decode(url.username())?);
    }
    if let Some(password) = url.password() {
        client = client.with_password(decode(password)?);
    }
    for (key, value) in settings {
        client = client.with_option(key, value);
    }

    Ok(client)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConnectionError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(ConnectionError::InvalidOption {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

fn parse_compression(value: &str) -> Compression {
    match value {
        "lz4" | "true" | "1" => Compression::Lz4,
        "none" | "false" | "0" | "" => Compression::None,
        other => {
            warn!(compress = other, "unsupported compression hint, sending uncompressed");
            Compression::None
        }
    }
}

fn normalize_setting(value: &str) -> Cow<'_, str> {
    match value {
        "true" => Cow::Borrowed("1"),
        "false" => Cow::Borrowed("0"),
        other => Cow::Borrowed(other),
    }
}

fn decode(component: &str) -> Result<String, ConnectionError> {
    percent_decode_str(component)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| ConnectionError::Open("credentials are not valid UTF-8".to_owned()))
}

/// A lazily-connected `ClickHouse` HTTP handle.
struct ClickHouseConnection {
    client: Client,
    closed: AtomicBool,
}

impl ClickHouseConnection {
    fn ensure_open(&self) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::Acquire) {
            Err(ConnectionError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for ClickHouseConnection {
    async fn execute(&self, sql: &str) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        self.client
            .query(sql)
            .execute()
            .await
            .map_err(|e| ConnectionError::Query(e.to_string()))
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        self.execute(PING_QUERY).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        // The HTTP client holds no session; pooled sockets are released
        // when the client is dropped.
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ConnectionError::Closed);
        }
        debug!("clickhouse connection closed");
        Ok(())
    }
}

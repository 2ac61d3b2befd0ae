//! `ClickHouse` connection management and schema provisioning.
//!
//! Configuration flows one way at start-up:
//! [`ClickHouseConfig`] → [`build_dsn`] → [`ConnectionManager`] →
//! [`Provisioner`] (driven by the [`TemplateStore`] and the [`clause`]
//! builders).

pub mod clause;
pub mod config;
pub mod connection;
pub mod driver;
pub mod dsn;
pub mod error;
pub mod provisioner;
pub mod schema;
pub mod template;
pub mod testing;

pub use config::ClickHouseConfig;
pub use connection::{Connection, ConnectionManager, DEFAULT_PING_TIMEOUT, Driver, DriverRegistry};
pub use driver::ClickHouseDriver;
pub use dsn::{Dsn, build_dsn};
pub use error::{ConfigError, ConnectionError, SchemaError, TemplateError};
pub use provisioner::{DatabaseOutcome, ProvisionReport, ProvisionState, Provisioner, TableOutcome};
pub use schema::{Statement, TableSpec, table_specs};
pub use template::{Template, TemplateStore};

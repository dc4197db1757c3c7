//! PostgreSQL client probes: the test actions exercised by the harness.
//!
//! Each action opens its own connection, does one thing, and closes it, so
//! any memory that survives a dispatch points at the client library.
//! Actions named `error_*` expect the server to refuse them; the refusal is
//! rendered to text (as a caller would) and discarded.

mod config;

use std::rc::Rc;

use anyhow::Context;
use postgres::{Client, NoTls};
use tracing::debug;

use crate::registry::{RegistryBuilder, RegistryError};

pub use config::{ProbeConfig, ProbeConfigError};

/// Query every fetch probe runs.
const FETCH_QUERY: &str = "SELECT 'some string' AS str";
/// A relation that is never created.
const MISSING_RELATION_QUERY: &str = "SELECT * FROM leakfinder_missing_relation";

/// Probe names in registration order.
pub const PROBE_NAMES: [&str; 8] = [
    "new_config",
    "connect",
    "error_in_connect",
    "error_in_query",
    "fetch_all",
    "fetch_all_and_free",
    "escape",
    "prepare_and_query",
];

/// Registers every probe, sharing one configuration.
pub fn register_postgres_probes(
    builder: &mut RegistryBuilder,
    config: ProbeConfig,
) -> Result<(), RegistryError> {
    let config = Rc::new(config);
    let probes: [fn(&ProbeConfig) -> anyhow::Result<()>; 8] = [
        new_config,
        connect_and_close,
        error_in_connect,
        error_in_query,
        fetch_all,
        fetch_all_and_free,
        escape,
        prepare_and_query,
    ];

    for (name, probe) in PROBE_NAMES.into_iter().zip(probes) {
        let config = Rc::clone(&config);
        builder.register(name, move || probe(&config))?;
    }
    Ok(())
}

/// Opens a client to `dbname`, over TLS when configured.
fn connect(config: &ProbeConfig, dbname: &str) -> anyhow::Result<Client> {
    let client_config = config.client_config(dbname);
    let client = if config.tls {
        let connector = native_tls::TlsConnector::builder()
            .build()
            .context("building TLS connector")?;
        client_config.connect(postgres_native_tls::MakeTlsConnector::new(connector))
    } else {
        client_config.connect(NoTls)
    };
    client.with_context(|| format!("connecting to {}:{}/{}", config.host, config.port, dbname))
}

fn new_config(config: &ProbeConfig) -> anyhow::Result<()> {
    let _client_config = config.client_config(&config.database);
    Ok(())
}

fn connect_and_close(config: &ProbeConfig) -> anyhow::Result<()> {
    connect(config, &config.database)?.close()?;
    Ok(())
}

fn error_in_connect(config: &ProbeConfig) -> anyhow::Result<()> {
    match connect(config, &config.denied_database) {
        Ok(client) => {
            debug!(
                "Connection to {} unexpectedly succeeded",
                config.denied_database
            );
            client.close()?;
        }
        Err(e) => {
            let _message = format!("{:#}", e);
        }
    }
    Ok(())
}

fn error_in_query(config: &ProbeConfig) -> anyhow::Result<()> {
    let mut client = connect(config, &config.database)?;
    if let Err(e) = client.query(MISSING_RELATION_QUERY, &[]) {
        let _message = e.to_string();
        let _code = e.code().map(|c| c.code().to_string());
    }
    client.close()?;
    Ok(())
}

fn fetch_rows(client: &mut Client) -> anyhow::Result<(Vec<postgres::Row>, Vec<String>)> {
    let rows = client.query(FETCH_QUERY, &[])?;
    let values = rows
        .iter()
        .map(|row| row.try_get::<_, String>(0))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, values))
}

fn fetch_all(config: &ProbeConfig) -> anyhow::Result<()> {
    let mut client = connect(config, &config.database)?;
    let (_rows, _values) = fetch_rows(&mut client)?;
    client.close()?;
    Ok(())
}

fn fetch_all_and_free(config: &ProbeConfig) -> anyhow::Result<()> {
    let mut client = connect(config, &config.database)?;
    let (rows, values) = fetch_rows(&mut client)?;
    drop(values);
    drop(rows);
    client.close()?;
    Ok(())
}

fn escape(config: &ProbeConfig) -> anyhow::Result<()> {
    let mut client = connect(config, &config.database)?;
    let row = client.query_one("SELECT quote_literal($1)", &[&"some string"])?;
    let _escaped: String = row.try_get(0)?;
    client.close()?;
    Ok(())
}

fn prepare_and_query(config: &ProbeConfig) -> anyhow::Result<()> {
    let mut client = connect(config, &config.database)?;
    let statement = client.prepare("SELECT $1::text AS str")?;
    let _rows = client.query(&statement, &[&"some string"])?;
    client.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Builtin;

    /// Points at a port nothing listens on, so connecting fails fast.
    fn unreachable_config() -> ProbeConfig {
        ProbeConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "leakfinder".to_string(),
            password: String::new(),
            database: "leakfinder".to_string(),
            denied_database: "leakfinder_denied".to_string(),
            tls: false,
        }
    }

    #[test]
    fn test_probes_registered_after_builtins() {
        let mut builder = RegistryBuilder::with_builtins();
        register_postgres_probes(&mut builder, unreachable_config()).unwrap();
        let registry = builder.build();

        let names: Vec<&str> = registry.all_names().collect();
        let expected: Vec<&str> = Builtin::ALL
            .iter()
            .map(|b| b.name())
            .chain(PROBE_NAMES)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_registering_twice_is_rejected() {
        let mut builder = RegistryBuilder::new();
        register_postgres_probes(&mut builder, unreachable_config()).unwrap();
        assert_eq!(
            register_postgres_probes(&mut builder, unreachable_config()),
            Err(RegistryError::Duplicate("new_config".to_string()))
        );
    }

    #[test]
    fn test_new_config_needs_no_server() {
        assert!(new_config(&unreachable_config()).is_ok());
    }

    #[test]
    fn test_connection_failure_is_an_error() {
        let err = fetch_all(&unreachable_config()).unwrap_err();
        assert!(format!("{:#}", err).starts_with("connecting to 127.0.0.1:1/leakfinder"));
    }

    #[test]
    fn test_error_in_connect_swallows_refusal() {
        assert!(error_in_connect(&unreachable_config()).is_ok());
    }
}

//! Connection settings for the PostgreSQL probes.
//!
//! Uses the standard libpq environment variables:
//! - PGHOST (default: localhost)
//! - PGPORT (default: 5432)
//! - PGUSER (default: $USER)
//! - PGPASSWORD (default: empty)
//! - PGDATABASE (default: same as the user)
//! - PGSSLMODE (`require` enables TLS)
//!
//! plus `LEAKFINDER_DENIED_DATABASE`, a database the user may not connect to.

use std::time::Duration;

const DEFAULT_DENIED_DATABASE: &str = "leakfinder_denied";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for probe configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeConfigError {
    /// Environment variable not set.
    EnvNotSet(String),
    /// PGPORT is not a port number.
    InvalidPort(String),
}

impl std::fmt::Display for ProbeConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeConfigError::EnvNotSet(var) => write!(f, "{} not set", var),
            ProbeConfigError::InvalidPort(port) => write!(f, "invalid PGPORT '{}'", port),
        }
    }
}

impl std::error::Error for ProbeConfigError {}

/// Resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub denied_database: String,
    pub tls: bool,
}

impl ProbeConfig {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ProbeConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProbeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = lookup("PGUSER")
            .or_else(|| lookup("USER"))
            .ok_or_else(|| ProbeConfigError::EnvNotSet("PGUSER or USER".to_string()))?;

        let host = lookup("PGHOST").unwrap_or_else(|| "localhost".to_string());
        let port = match lookup("PGPORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ProbeConfigError::InvalidPort(raw.clone()))?,
            None => 5432,
        };
        let password = lookup("PGPASSWORD").unwrap_or_default();
        let database = lookup("PGDATABASE").unwrap_or_else(|| user.clone());
        let denied_database = lookup("LEAKFINDER_DENIED_DATABASE")
            .unwrap_or_else(|| DEFAULT_DENIED_DATABASE.to_string());
        let tls = lookup("PGSSLMODE").is_some_and(|mode| mode == "require");

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            denied_database,
            tls,
        })
    }

    /// Client configuration for `dbname`.
    pub fn client_config(&self, dbname: &str) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(dbname)
            .connect_timeout(CONNECT_TIMEOUT);
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }

    /// `host:port/database`, for logs.
    pub fn describe(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_user() {
        let config = ProbeConfig::from_lookup(lookup(&[("USER", "alice")])).unwrap();
        assert_eq!(config.user, "alice");
        assert_eq!(config.database, "alice");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.password, "");
        assert_eq!(config.denied_database, "leakfinder_denied");
        assert!(!config.tls);
        assert_eq!(config.describe(), "localhost:5432/alice");
    }

    #[test]
    fn test_pg_variables_override() {
        let config = ProbeConfig::from_lookup(lookup(&[
            ("USER", "alice"),
            ("PGUSER", "postgres"),
            ("PGHOST", "db.internal"),
            ("PGPORT", "6432"),
            ("PGPASSWORD", "secret"),
            ("PGDATABASE", "app"),
            ("PGSSLMODE", "require"),
            ("LEAKFINDER_DENIED_DATABASE", "locked"),
        ]))
        .unwrap();

        assert_eq!(config.user, "postgres");
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6432);
        assert_eq!(config.password, "secret");
        assert_eq!(config.database, "app");
        assert_eq!(config.denied_database, "locked");
        assert!(config.tls);
    }

    #[test]
    fn test_missing_user() {
        assert_eq!(
            ProbeConfig::from_lookup(lookup(&[])),
            Err(ProbeConfigError::EnvNotSet("PGUSER or USER".to_string()))
        );
    }

    #[test]
    fn test_invalid_port() {
        let err = ProbeConfig::from_lookup(lookup(&[("USER", "a"), ("PGPORT", "abc")])).unwrap_err();
        assert_eq!(err, ProbeConfigError::InvalidPort("abc".to_string()));
        assert_eq!(err.to_string(), "invalid PGPORT 'abc'");
    }

    #[test]
    fn test_client_config() {
        let config = ProbeConfig::from_lookup(lookup(&[("USER", "alice"), ("PGPASSWORD", "pw")]))
            .unwrap();
        let client = config.client_config("other");
        assert_eq!(client.get_dbname(), Some("other"));
        assert_eq!(client.get_user(), Some("alice"));
        assert_eq!(client.get_password(), Some(&b"pw"[..]));
        assert_eq!(client.get_ports(), &[5432]);
    }
}

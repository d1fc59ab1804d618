//! # Store Configuration
//!
//! Environment-driven settings for binaries that open the store.
//!
//! ## Environment Variables
//! ```text
//! ECOFRALDAS_DB_PATH              SQLite file             (default: ecofraldas.db)
//! ECOFRALDAS_DB_MAX_CONNECTIONS   pool size               (default: 5)
//! ECOFRALDAS_TX_RETRY_LIMIT       attempts per operation  (default: 3)
//! ECOFRALDAS_BUSY_TIMEOUT_MS      SQLite busy timeout     (default: 5000)
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::pool::DbConfig;

const DEFAULT_DB_PATH: &str = "ecofraldas.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_RETRY_LIMIT: u32 = 3;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },
}

/// Settings read at startup. Serializes to JSON for the startup log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub max_connections: u32,
    pub tx_retry_limit: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            tx_retry_limit: DEFAULT_RETRY_LIMIT,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StoreConfig::default();

        let db_path = lookup("ECOFRALDAS_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let max_connections =
            parse_var(&lookup, "ECOFRALDAS_DB_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections);
        let tx_retry_limit =
            parse_var(&lookup, "ECOFRALDAS_TX_RETRY_LIMIT")?.unwrap_or(defaults.tx_retry_limit);
        let busy_timeout_ms =
            parse_var(&lookup, "ECOFRALDAS_BUSY_TIMEOUT_MS")?.unwrap_or(defaults.busy_timeout_ms);

        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ECOFRALDAS_DB_MAX_CONNECTIONS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(StoreConfig {
            db_path,
            max_connections,
            tx_retry_limit,
            busy_timeout_ms,
        })
    }

    /// Builds the pool configuration these settings describe.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.db_path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .retry_attempts(self.tx_retry_limit)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: raw,
            }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = StoreConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("ECOFRALDAS_DB_PATH", "/data/store.db"),
            ("ECOFRALDAS_DB_MAX_CONNECTIONS", "12"),
            ("ECOFRALDAS_TX_RETRY_LIMIT", "8"),
            ("ECOFRALDAS_BUSY_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/data/store.db"));
        assert_eq!(config.max_connections, 12);

        let db = config.db_config();
        assert_eq!(db.max_connections, 12);
        assert_eq!(db.retry.max_attempts, 8);
        assert_eq!(db.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_number() {
        let err = StoreConfig::from_lookup(lookup_from(&[("ECOFRALDAS_TX_RETRY_LIMIT", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref name, ref value }
                if name == "ECOFRALDAS_TX_RETRY_LIMIT" && value == "lots"
        ));
    }

    #[test]
    fn test_serializes_for_startup_log() {
        let config = StoreConfig::from_lookup(lookup_from(&[("ECOFRALDAS_DB_PATH", "/data/store.db")])).unwrap();
        let json: serde_json::Value = serde_json::to_value(&config).unwrap();

        assert_eq!(json["db_path"], "/data/store.db");
        assert_eq!(json["max_connections"], 5);
        assert_eq!(json["tx_retry_limit"], 3);
        assert_eq!(json["busy_timeout_ms"], 5000);
    }

    #[test]
    fn test_zero_connections_rejected() {
        assert!(StoreConfig::from_lookup(lookup_from(&[("ECOFRALDAS_DB_MAX_CONNECTIONS", "0")])).is_err());
    }
}

//! Configuration for the wallet engine

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Settlement currency (ISO 4217)
    pub currency: String,

    /// Whether notification dispatch is enabled
    pub notifications_enabled: bool,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: "LKR".to_string(),
            notifications_enabled: true,
            database: DatabaseConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("read {}: {}", path.as_ref().display(), e)))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("parse config: {}", e)))
    }
}

/// Postgres connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL
    pub url: String,

    /// Pool size
    pub max_connections: u32,

    /// Connection acquire timeout (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/vendora".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.currency, "LKR");
        assert!(config.notifications_enabled);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = LedgerConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let back: LedgerConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.currency, config.currency);
        assert_eq!(back.database.url, config.database.url);
    }
}

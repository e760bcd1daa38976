//! Configuration for the wallet ledger

use crate::registry::CodeRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which persistent substrate backs the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// RocksDB directory under `data_dir`
    Rocksdb,
    /// Process-local memory (nothing survives a restart)
    Memory,
}

impl Backend {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rocksdb" => Some(Backend::Rocksdb),
            "memory" => Some(Backend::Memory),
            _ => None,
        }
    }
}

/// Wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Storage backend
    pub backend: Backend,

    /// Ledger actor mailbox size
    pub mailbox_capacity: usize,

    /// Buffered change-feed events per listener
    pub feed_capacity: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Redeemable codes and their values
    pub codes: BTreeMap<String, u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet"),
            service_name: "green-wallet".to_string(),
            backend: Backend::Rocksdb,
            mailbox_capacity: 64,
            feed_capacity: 256,
            rocksdb: RocksDBConfig::default(),
            codes: CodeRegistry::demo()
                .entries()
                .map(|(code, value)| (code.to_string(), value))
                .collect(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Sync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 4,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("WALLET_BACKEND") {
            config.backend = Backend::parse(&backend).ok_or_else(|| {
                crate::Error::Config(format!("Unknown backend: {}", backend))
            })?;
        }

        if let Ok(capacity) = std::env::var("WALLET_MAILBOX_CAPACITY") {
            config.mailbox_capacity = capacity.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid WALLET_MAILBOX_CAPACITY: {}", e))
            })?;
        }

        Ok(config)
    }

    /// Build the code registry from the `codes` table
    pub fn registry(&self) -> crate::Result<CodeRegistry> {
        CodeRegistry::from_entries(self.codes.iter().map(|(code, value)| (code, *value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "green-wallet");
        assert_eq!(config.backend, Backend::Rocksdb);
        assert_eq!(config.registry().unwrap(), CodeRegistry::demo());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            backend = "memory"
            mailbox_capacity = 8

            [codes]
            spring5 = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.registry().unwrap().lookup("SPRING5"), Some(5));
        assert_eq!(config.registry().unwrap().lookup("CLEAN10"), None);
    }

    #[test]
    fn test_invalid_codes_rejected() {
        let config: Config = toml::from_str("[codes]\nfree = 0\n").unwrap();
        assert!(config.registry().is_err());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(Backend::parse("RocksDB"), Some(Backend::Rocksdb));
        assert_eq!(Backend::parse("memory"), Some(Backend::Memory));
        assert_eq!(Backend::parse("sqlite"), None);
    }
}

//! Engine configuration
//!
//! Selects the store backend and, optionally, the identity the local node
//! registers under when the engine opens. Loaded from a JSON file or from
//! `HIGHWATER_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Database path value that selects the in-memory store
pub const MEMORY_DATABASE: &str = ":memory:";

pub const ENV_DATABASE: &str = "HIGHWATER_DATABASE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "HIGHWATER_BUSY_TIMEOUT_MS";
pub const ENV_NODE_URL: &str = "HIGHWATER_NODE_URL";
pub const ENV_NODE_METADATA: &str = "HIGHWATER_NODE_METADATA";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Which store backs the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process memory; nothing survives a restart
    Memory,

    /// SQLite database file
    Sqlite {
        path: PathBuf,

        /// How long a writer waits for another connection's lock
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
}

impl StoreConfig {
    /// Sqlite store at `path` with the default busy timeout
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        StoreConfig::Sqlite {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Identity the local node registers under
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Advertised endpoint
    pub url: String,

    /// Free-form description
    #[serde(default)]
    pub metadata: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,

    /// Register this node when the engine opens
    #[serde(default)]
    pub node: Option<NodeConfig>,
}

impl EngineConfig {
    pub fn with_store(store: StoreConfig) -> Self {
        Self { store, node: None }
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let busy_timeout_ms = match lookup(ENV_BUSY_TIMEOUT_MS) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_BUSY_TIMEOUT_MS,
                value,
            })?,
            None => default_busy_timeout_ms(),
        };

        let store = match lookup(ENV_DATABASE) {
            None => StoreConfig::Memory,
            Some(value) if value == MEMORY_DATABASE => StoreConfig::Memory,
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::InvalidEnv {
                    name: ENV_DATABASE,
                    value,
                })
            }
            Some(value) => StoreConfig::Sqlite {
                path: PathBuf::from(value),
                busy_timeout_ms,
            },
        };

        let node = lookup(ENV_NODE_URL).map(|url| NodeConfig {
            url,
            metadata: lookup(ENV_NODE_METADATA).unwrap_or_default(),
        });

        Ok(Self { store, node })
    }
}

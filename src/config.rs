//! Configuration for node-reputation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::directory::NodeDescriptor;
use crate::error::StoreError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("node-reputation")
}

/// Storage engine backing the reputation and irreparable-segment stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Sled,
}

impl FromStr for Backend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Backend::Sqlite),
            "sled" => Ok(Backend::Sled),
            other => Err(StoreError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite file and the sled database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Storage engine for reputation and irreparable segments
    #[serde(default)]
    pub backend: Backend,

    /// Shared API key every caller must present. Empty rejects all calls.
    /// Read from the file but never written back by [`Config::save`].
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Directory cache refresh interval in seconds (0 disables the timer)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Upper bound on the candidate list accepted by node selection
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Descriptors fed to the directory cache on every refresh
    #[serde(default)]
    pub seed_nodes: Vec<NodeDescriptor>,
}

fn default_http_port() -> u16 {
    7778
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_max_candidates() -> usize {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            backend: Backend::default(),
            api_key: String::new(),
            http_port: default_http_port(),
            refresh_interval_secs: default_refresh_interval(),
            max_candidates: default_max_candidates(),
            seed_nodes: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Save config to file, without the API key
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// SQLite database file
    pub fn sqlite_path(&self) -> PathBuf {
        self.storage_dir.join("reputation.db")
    }

    /// sled database directory
    pub fn sled_path(&self) -> PathBuf {
        self.storage_dir.join("stores.sled")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

//! Service configuration
//!
//! Loaded from an optional TOML file named by `SHEETGRID_CONFIG`, then
//! overridden by `SHEETGRID_*` environment variables. Every field has a default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::wal::WalMode;

mod defaults {
    use std::path::PathBuf;

    pub fn bind_addr() -> String { "0.0.0.0".to_string() }
    pub fn port() -> u16 { 3030 }

    pub fn data_dir() -> PathBuf { "./data/sheetgrid".into() }
    pub fn group_commit_ms() -> u64 { 10 }
    pub fn pool_size() -> usize { 16 }
    pub fn acquire_timeout_ms() -> u64 { 5_000 }

    pub fn default_limit() -> u32 { 200 }
    pub fn max_limit() -> u32 { 1_000 }
    pub fn read_batch() -> usize { 100 }
    pub fn channel_depth() -> usize { 4 }

    pub fn bulk_rows() -> u64 { 100_000 }
    pub fn bulk_batch_size() -> usize { 5_000 }
    pub fn progress_interval_ms() -> u64 { 200 }
    pub fn terminal_retention_secs() -> u64 { 60 }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: defaults::bind_addr(), port: defaults::port() }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
    /// `off` | `async` | `sync`
    #[serde(default)]
    pub wal_mode: WalMode,
    #[serde(default = "defaults::group_commit_ms")]
    pub group_commit_ms: u64,
    /// Concurrent streaming queries allowed to hold a store connection.
    #[serde(default = "defaults::pool_size")]
    pub pool_size: usize,
    #[serde(default = "defaults::acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            wal_mode: WalMode::default(),
            group_commit_ms: defaults::group_commit_ms(),
            pool_size: defaults::pool_size(),
            acquire_timeout_ms: defaults::acquire_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Volatile store: no WAL, nothing written to disk.
    pub fn in_memory() -> Self {
        Self { wal_mode: WalMode::Disabled, ..Default::default() }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "defaults::default_limit")]
    pub default_limit: u32,
    #[serde(default = "defaults::max_limit")]
    pub max_limit: u32,
    /// Rows fetched from the store cursor per round trip.
    #[serde(default = "defaults::read_batch")]
    pub read_batch: usize,
    /// Encoded batches buffered between the producer task and the response body.
    #[serde(default = "defaults::channel_depth")]
    pub channel_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: defaults::default_limit(),
            max_limit: defaults::max_limit(),
            read_batch: defaults::read_batch(),
            channel_depth: defaults::channel_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "defaults::bulk_rows")]
    pub bulk_rows: u64,
    #[serde(default = "defaults::bulk_batch_size")]
    pub bulk_batch_size: usize,
    #[serde(default = "defaults::progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// How long a finished job nobody subscribed to stays queryable.
    #[serde(default = "defaults::terminal_retention_secs")]
    pub terminal_retention_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            bulk_rows: defaults::bulk_rows(),
            bulk_batch_size: defaults::bulk_batch_size(),
            progress_interval_ms: defaults::progress_interval_ms(),
            terminal_retention_secs: defaults::terminal_retention_secs(),
        }
    }
}

impl JobsConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl ServiceConfig {
    /// Load from `SHEETGRID_CONFIG` (if set) and apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os("SHEETGRID_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::validation(format!("config: {}", e)))
    }

    /// Override fields from `SHEETGRID_*` variables. `lookup` is injectable for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SHEETGRID_BIND") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("SHEETGRID_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = lookup("SHEETGRID_DATA_DIR") {
            self.store.data_dir = v.into();
        }
        if let Some(v) = lookup("SHEETGRID_WAL_MODE") {
            self.store.wal_mode = WalMode::from_str(&v);
        }
        if let Some(v) = lookup("SHEETGRID_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.store.pool_size = v;
        }
        if let Some(v) = lookup("SHEETGRID_BULK_ROWS").and_then(|v| v.parse().ok()) {
            self.jobs.bulk_rows = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.max_limit == 0 || self.query.default_limit == 0 {
            return Err(Error::validation("query limits must be positive"));
        }
        if self.query.default_limit > self.query.max_limit {
            return Err(Error::validation("query.default_limit exceeds query.max_limit"));
        }
        if self.query.read_batch == 0 || self.jobs.bulk_batch_size == 0 {
            return Err(Error::validation("batch sizes must be positive"));
        }
        if self.store.pool_size == 0 {
            return Err(Error::validation("store.pool_size must be positive"));
        }
        Ok(())
    }
}

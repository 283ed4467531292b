//! Write-Ahead Log (WAL) Module
//!
//! Pluggable durability layer for the row store with runtime selection.
//! Similar to PostgreSQL's `synchronous_commit` and SQLite's journal modes.
//!
//! # Example
//! ```ignore
//! use sheetgrid::wal::{WalConfig, WalMode};
//!
//! // Volatile (no durability)
//! let wal = WalConfig::new(WalMode::Disabled).build()?;
//!
//! // Crash-safe mode (fsync on every commit)
//! let wal = WalConfig::new(WalMode::Sync).path("./data").build()?;
//! ```

mod traits;
mod noop;
mod disk;

pub use traits::{WriteAheadLog, WalEntry, WalOp, Lsn};
pub use noop::NoOpWal;
pub use disk::{DiskWal, DiskWalConfig};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};

/// WAL mode - selectable at runtime
///
/// - `Disabled` = nothing persisted (fastest)
/// - `Async` = group commit by a background thread, commits return before fsync
/// - `Sync` = every commit is fsynced before it returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum WalMode {
    Disabled,
    Async,
    #[default]
    Sync,
}

impl WalMode {
    /// Parse from string (case-insensitive). Unknown values fall back to the default.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "disabled" | "none" | "noop" | "memory" => WalMode::Disabled,
            "async" | "buffered" | "relaxed" => WalMode::Async,
            "sync" | "wal" | "durable" | "disk" => WalMode::Sync,
            _ => WalMode::default(),
        }
    }
}

impl From<String> for WalMode {
    fn from(s: String) -> Self {
        WalMode::from_str(&s)
    }
}

/// WAL configuration
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub mode: WalMode,
    /// Group commit interval in milliseconds
    pub group_commit_ms: u64,
    /// WAL directory (required unless disabled)
    pub path: Option<PathBuf>,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            mode: WalMode::default(),
            group_commit_ms: 10,
            path: None,
        }
    }
}

impl WalConfig {
    pub fn new(mode: WalMode) -> Self {
        Self { mode, ..Default::default() }
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn group_commit_ms(mut self, ms: u64) -> Self {
        self.group_commit_ms = ms;
        self
    }

    pub fn build(&self) -> Result<Arc<dyn WriteAheadLog>> {
        match self.mode {
            WalMode::Disabled => Ok(Arc::new(NoOpWal::new())),
            WalMode::Async | WalMode::Sync => {
                let path = self
                    .path
                    .as_deref()
                    .ok_or_else(|| Error::Wal("a directory is required unless the WAL is disabled".into()))?;
                let config = DiskWalConfig {
                    group_commit_ms: self.group_commit_ms,
                    sync_on_commit: self.mode == WalMode::Sync,
                    ..Default::default()
                };
                Ok(Arc::new(DiskWal::with_config(path, config)?))
            }
        }
    }
}

//! Transaction bookkeeping for the row store.
//!
//! Row mutations outside a bulk load are single-statement and commit
//! immediately. A bulk load opens an explicit transaction whose writes are
//! staged privately until `commit`, so readers never observe a partial load.
//!
//! # Example
//! ```ignore
//! use sheetgrid::txn::{CommitMode, TxnManager};
//!
//! let mgr = TxnManager::new();
//! let mut txn = mgr.begin(CommitMode::Async);
//! txn.record_writes(5_000);
//! mgr.commit(&mut txn)?;
//! ```

mod transaction;
mod version;
mod manager;

pub use transaction::{Transaction, TxnId, TxnState};
pub use version::{Version, VersionTracker};
pub use manager::TxnManager;

/// Durability of a single commit - runtime selectable like the WAL mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitMode {
    /// Commit returns after the WAL has been fsynced (when the WAL is enabled).
    #[default]
    Sync,

    /// Commit returns once entries are queued for the group-commit thread.
    /// A crash may lose the tail, never a partial transaction.
    Async,
}

impl CommitMode {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "async" | "off" | "relaxed" | "local" => CommitMode::Async,
            "sync" | "on" | "durable" => CommitMode::Sync,
            _ => CommitMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_mode_parsing() {
        assert_eq!(CommitMode::from_str("OFF"), CommitMode::Async);
        assert_eq!(CommitMode::from_str("durable"), CommitMode::Sync);
        assert_eq!(CommitMode::from_str("???"), CommitMode::Sync);
    }
}

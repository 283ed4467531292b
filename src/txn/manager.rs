//! Transaction Manager

use super::{CommitMode, Transaction, TxnState, VersionTracker};
use crate::error::{Error, Result};

/// Hands out transactions and advances the store version on commit.
/// Single-row writes call `autocommit` instead of opening a transaction.
#[derive(Default)]
pub struct TxnManager {
    tracker: VersionTracker,
}

impl TxnManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, mode: CommitMode) -> Transaction {
        let id = self.tracker.next_txn_id();
        self.tracker.begin_txn(id);
        Transaction::new(id, mode)
    }

    pub fn commit(&self, txn: &mut Transaction) -> Result<()> {
        if !txn.is_active() {
            return Err(Error::validation(format!("transaction {} is not active", txn.id)));
        }
        self.tracker.end_txn(txn.id, !txn.is_read_only());
        txn.state = TxnState::Committed;
        Ok(())
    }

    /// Idempotent; rolling back a finished transaction is a no-op.
    pub fn rollback(&self, txn: &mut Transaction) {
        if txn.is_active() {
            self.tracker.end_txn(txn.id, false);
            txn.state = TxnState::RolledBack;
        }
    }

    /// Record a committed single-statement write.
    pub fn autocommit(&self) -> u64 {
        self.tracker.increment()
    }

    pub fn active_count(&self) -> usize {
        self.tracker.active_count()
    }

    pub fn current_version(&self) -> u64 {
        self.tracker.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_bumps_version_only_for_writes() {
        let mgr = TxnManager::new();

        let mut read_only = mgr.begin(CommitMode::Sync);
        mgr.commit(&mut read_only).unwrap();
        assert_eq!(mgr.current_version(), 0);

        let mut txn = mgr.begin(CommitMode::Async);
        assert_eq!(mgr.active_count(), 1);
        txn.record_writes(10);
        mgr.commit(&mut txn).unwrap();
        assert_eq!(mgr.current_version(), 1);
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let mgr = TxnManager::new();
        let mut txn = mgr.begin(CommitMode::Async);
        txn.record_writes(3);
        mgr.rollback(&mut txn);
        mgr.rollback(&mut txn);
        assert_eq!(txn.state, TxnState::RolledBack);
        assert!(mgr.commit(&mut txn).is_err());
        assert_eq!(mgr.current_version(), 0);
    }

    #[test]
    fn test_concurrent_commits() {
        use std::sync::Arc;
        use std::thread;

        let mgr = Arc::new(TxnManager::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&mgr);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let mut txn = m.begin(CommitMode::Async);
                        txn.record_writes(1);
                        m.commit(&mut txn).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(mgr.current_version(), 4000);
    }
}

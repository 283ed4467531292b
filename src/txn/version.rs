//! Version tracking for store commits
//!
//! Lock-free: a DashSet of active transactions and atomic counters.

use std::sync::atomic::{AtomicU64, Ordering};
use dashmap::DashSet;
use super::TxnId;

/// Version number type
pub type Version = u64;

pub struct VersionTracker {
    /// Current committed version
    current: AtomicU64,
    /// Set of active transaction IDs (lock-free, sharded)
    active: DashSet<TxnId>,
    next_txn_id: AtomicU64,
}

impl VersionTracker {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            active: DashSet::new(),
            next_txn_id: AtomicU64::new(1),
        }
    }

    #[inline]
    pub fn current(&self) -> Version {
        self.current.load(Ordering::Acquire)
    }

    #[inline]
    pub fn next_txn_id(&self) -> TxnId {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn begin_txn(&self, txn_id: TxnId) {
        self.active.insert(txn_id);
    }

    /// End a transaction; a committed write transaction bumps the version.
    pub fn end_txn(&self, txn_id: TxnId, committed_writes: bool) {
        self.active.remove(&txn_id);
        if committed_writes {
            self.increment();
        }
    }

    /// Increment version and return new value
    #[inline]
    pub fn increment(&self) -> Version {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Default for VersionTracker {
    fn default() -> Self {
        Self::new()
    }
}

//! Transaction Implementation

use super::CommitMode;

/// Unique transaction identifier
pub type TxnId = u64;

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Transaction is active
    Active,
    /// Transaction was committed successfully
    Committed,
    /// Transaction was rolled back
    RolledBack,
}

/// Metadata for an open transaction. The staged rows themselves live with
/// whoever opened it (see `store::memory::MemoryBulkTxn`).
#[derive(Debug)]
pub struct Transaction {
    pub id: TxnId,
    pub state: TxnState,
    pub commit_mode: CommitMode,
    /// Rows written so far
    pub writes: u64,
}

impl Transaction {
    pub fn new(id: TxnId, commit_mode: CommitMode) -> Self {
        Self {
            id,
            state: TxnState::Active,
            commit_mode,
            writes: 0,
        }
    }

    pub fn record_writes(&mut self, n: usize) {
        self.writes += n as u64;
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    pub fn is_read_only(&self) -> bool {
        self.writes == 0
    }
}

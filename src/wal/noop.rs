//! No-Op WAL Implementation
//!
//! Does nothing - fastest option, no durability.

use super::{Lsn, WalEntry, WriteAheadLog};
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// A WAL that does nothing (null object pattern)
pub struct NoOpWal {
    lsn: AtomicU64,
}

impl NoOpWal {
    pub fn new() -> Self {
        Self { lsn: AtomicU64::new(0) }
    }
}

impl Default for NoOpWal {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteAheadLog for NoOpWal {
    fn append(&self, _entry: &WalEntry) -> Result<Lsn> {
        Ok(self.lsn.fetch_add(1, Ordering::Relaxed))
    }

    fn append_batch(&self, entries: &[WalEntry]) -> Result<Lsn> {
        Ok(self.lsn.fetch_add(entries.len() as u64, Ordering::Relaxed))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn sync_on_commit(&self) -> bool {
        false
    }

    fn replay_from(&self, _from: Lsn) -> Result<Vec<WalEntry>> {
        Ok(vec![])
    }

    fn current_lsn(&self) -> Lsn {
        self.lsn.load(Ordering::Relaxed)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WalOp;

    #[test]
    fn test_noop_wal() {
        let wal = NoOpWal::new();
        let entry = WalEntry::new(WalOp::DeleteRow { table: "t".into(), row_id: 1 });

        assert_eq!(wal.append(&entry).unwrap(), 0);
        assert_eq!(wal.append(&entry).unwrap(), 1);
        assert_eq!(wal.current_lsn(), 2);
        assert!(wal.replay_from(0).unwrap().is_empty());
        assert!(!wal.is_enabled());
    }
}

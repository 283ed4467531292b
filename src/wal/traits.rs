//! WAL Trait Definitions

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ColumnSpec;

/// Log Sequence Number
pub type Lsn = u64;

/// A single WAL entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub lsn: Lsn,
    pub timestamp: u64,
    pub op: WalOp,
}

impl WalEntry {
    pub fn new(op: WalOp) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { lsn: 0, timestamp, op }
    }
}

/// Operations that can be logged.
///
/// Row payloads are carried as JSON text because bincode cannot encode
/// self-describing `serde_json::Value`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalOp {
    CreateTable { table: String, columns: Vec<ColumnSpec> },
    AddColumn { table: String, column: ColumnSpec },
    DropColumn { table: String, name: String },
    RenameColumn { table: String, from: String, to: String },
    SetColumnType { table: String, column: ColumnSpec },
    PutRow {
        table: String,
        row_id: u64,
        data: String,
        created_at_us: i64,
        updated_at_us: i64,
    },
    DeleteRow { table: String, row_id: u64 },
    /// Opens a bulk transaction; its rows apply only if `CommitBulk` follows.
    BeginBulk { txn: u64 },
    CommitBulk { txn: u64 },
}

/// Write-Ahead Log trait
///
/// Implementations:
/// - `NoOpWal`: Does nothing (fastest, no durability)
/// - `DiskWal`: Appends to disk with group commit (crash-safe in sync mode)
pub trait WriteAheadLog: Send + Sync {
    /// Append a single entry, returns LSN
    fn append(&self, entry: &WalEntry) -> Result<Lsn>;

    /// Batch append; entries become durable together
    fn append_batch(&self, entries: &[WalEntry]) -> Result<Lsn>;

    /// Force pending entries to disk and fsync
    fn sync(&self) -> Result<()>;

    /// Whether commits should call `sync` before returning
    fn sync_on_commit(&self) -> bool;

    /// Replay entries with `lsn >= from` (for crash recovery)
    fn replay_from(&self, from: Lsn) -> Result<Vec<WalEntry>>;

    /// Next LSN to be assigned
    fn current_lsn(&self) -> Lsn;

    fn is_enabled(&self) -> bool;
}

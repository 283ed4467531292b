//! Row storage
//!
//! The streaming executor and the bulk loader talk to storage only through
//! the traits below. `MemoryRowStore` is the embedded implementation: tables
//! of JSON-valued rows with a write-ahead log, a search index per table and
//! staged bulk transactions.

mod table;
mod memory;
pub mod pool;

pub use memory::MemoryRowStore;
pub use pool::{ConnectionPool, PoolPermit};
pub use table::check_row;

use crate::error::{Error, Result};
use crate::query::CompiledQuery;
use crate::txn::CommitMode;
use crate::types::{Column, Row, RowData};

/// Server-side cursor over one page of results.
pub trait RowCursor: Send {
    /// Up to `n` more rows in query order. Empty once exhausted.
    fn fetch(&mut self, n: usize) -> Result<Vec<Row>>;
}

/// Options for a bulk transaction.
#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    pub commit_mode: CommitMode,
    /// Drop the table's search index while the transaction is open and
    /// rebuild it on commit or rollback.
    pub suspend_indexes: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self { commit_mode: CommitMode::Async, suspend_indexes: true }
    }
}

/// An open bulk transaction. Staged rows are invisible until `commit`.
/// Dropping an uncommitted transaction rolls it back.
pub trait BulkTxn: Send {
    /// Columns of the target table as of `begin_bulk`.
    fn columns(&self) -> &[Column];

    /// Validate and stage rows; returns the number staged so far.
    fn append(&mut self, rows: Vec<RowData>) -> Result<u64>;

    /// Publish every staged row atomically; returns the number committed.
    fn commit(self: Box<Self>) -> Result<u64>;

    fn rollback(self: Box<Self>);
}

/// Storage collaborator for queries and bulk loads.
pub trait RowStore: Send + Sync {
    /// Columns of `table` ordered by position.
    fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Rows matching the query's filter; ignores cursor and limit.
    fn count(&self, query: &CompiledQuery) -> Result<u64>;

    /// Open a cursor over at most `query.limit` rows after the keyset bound.
    fn open_cursor(&self, query: &CompiledQuery) -> Result<Box<dyn RowCursor>>;

    fn begin_bulk(&self, table: &str, options: BulkOptions) -> Result<Box<dyn BulkTxn>>;

    /// Committed rows in `table`.
    fn row_count(&self, table: &str) -> Result<u64>;
}

/// Cursor over rows already materialized in order.
pub struct VecCursor {
    rows: std::vec::IntoIter<Row>,
}

impl VecCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into_iter() }
    }
}

impl RowCursor for VecCursor {
    fn fetch(&mut self, n: usize) -> Result<Vec<Row>> {
        Ok(self.rows.by_ref().take(n).collect())
    }
}

/// Run a synchronous store call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Unavailable(format!("store task failed: {}", e)))?
}

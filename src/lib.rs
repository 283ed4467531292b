// sheetgrid - Streaming Row-Query Engine
// Keyset-paginated NDJSON row streams over spreadsheet-style tables

pub mod config;
pub mod error;
pub mod types;
pub mod wal;
pub mod txn;
pub mod index;
pub mod query;
pub mod store;
pub mod stream;
pub mod client;
pub mod jobs;
pub mod http;

// Re-export main types
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use types::{Column, ColumnSpec, Condition, Cursor, DataType, FilterOp, JobEvent, PageRequest, Row, RowData, RowId, SortDir};
pub use store::{MemoryRowStore, RowStore};
pub use stream::StreamExecutor;
pub use client::{LocalSource, PageSource, StreamConsumer};
pub use jobs::{JobId, JobRegistry};
pub use http::{build_router, AppState};

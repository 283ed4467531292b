//! Streaming query executor
//!
//! `stream` validates and compiles a page request, takes a pooled store
//! connection, counts, then hands back a stream of NDJSON batches produced by
//! a background task. The producer owns the connection permit and the store
//! cursor; when the consumer goes away the next channel send fails and the
//! producer returns, releasing both.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::codec::{encode_line, error_line, header_line};
use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::query::{compile, render_select, CompiledQuery};
use crate::store::{blocking, ConnectionPool, PoolPermit, RowCursor, RowStore};
use crate::types::PageRequest;

/// Body of a streaming response: one `Bytes` per encoded batch.
pub type RowStream = ReceiverStream<Bytes>;

#[derive(Clone)]
pub struct StreamExecutor {
    store: Arc<dyn RowStore>,
    pool: ConnectionPool,
    config: QueryConfig,
}

impl StreamExecutor {
    pub fn new(store: Arc<dyn RowStore>, pool: ConnectionPool, config: QueryConfig) -> Self {
        Self { store, pool, config }
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Requested limit, defaulted and checked against `1..=max_limit`.
    pub fn resolve_limit(&self, requested: Option<u32>) -> Result<usize> {
        let limit = requested.unwrap_or(self.config.default_limit);
        if limit == 0 || limit > self.config.max_limit {
            return Err(Error::validation(format!(
                "limit must be between 1 and {}, got {}",
                self.config.max_limit, limit
            )));
        }
        Ok(limit as usize)
    }

    /// Validate and compile without holding a pooled connection.
    pub async fn prepare(&self, table: &str, request: &PageRequest) -> Result<CompiledQuery> {
        let limit = self.resolve_limit(request.limit)?;
        let store = Arc::clone(&self.store);
        let name = table.to_string();
        let columns = blocking(move || store.columns(&name)).await?;
        let query = compile(table, request, &columns, limit)?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let sql = render_select(&query);
            tracing::debug!(table, sql = %sql.text, params = sql.params.len(), "compiled page query");
        }
        Ok(query)
    }

    /// Count, then start streaming. Errors returned here happen before any
    /// byte of the response is produced.
    pub async fn execute(&self, query: CompiledQuery) -> Result<RowStream> {
        let permit = self.pool.acquire().await?;

        let store = Arc::clone(&self.store);
        let (query, total) = blocking(move || {
            let total = store.count(&query)?;
            Ok((query, total))
        })
        .await?;
        let header = header_line(total)?;

        let (tx, rx) = mpsc::channel(self.config.channel_depth.max(1));
        let producer = Producer {
            store: Arc::clone(&self.store),
            tx,
            read_batch: self.config.read_batch.max(1),
            _permit: permit,
        };
        tokio::spawn(producer.run(query, header));
        Ok(ReceiverStream::new(rx))
    }

    pub async fn stream(&self, table: &str, request: &PageRequest) -> Result<RowStream> {
        let query = self.prepare(table, request).await?;
        self.execute(query).await
    }
}

struct Producer {
    store: Arc<dyn RowStore>,
    tx: mpsc::Sender<Bytes>,
    read_batch: usize,
    /// Held until the producer finishes.
    _permit: PoolPermit,
}

impl Producer {
    async fn run(self, query: CompiledQuery, header: Vec<u8>) {
        let table = query.table.clone();
        match self.pump(query, header).await {
            Ok(Some(rows)) => tracing::debug!(%table, rows, "stream complete"),
            Ok(None) => tracing::debug!(%table, "client disconnected, stream cancelled"),
            Err(e) => {
                tracing::warn!(%table, error = %e, "stream failed");
                let _ = self.tx.send(Bytes::from(error_line(&e.to_string()))).await;
            }
        }
    }

    /// Rows sent, or `None` if the receiver went away.
    async fn pump(&self, query: CompiledQuery, header: Vec<u8>) -> Result<Option<u64>> {
        if self.tx.send(Bytes::from(header)).await.is_err() {
            return Ok(None);
        }

        let limit = query.limit;
        let store = Arc::clone(&self.store);
        let mut cursor: Box<dyn RowCursor> = blocking(move || store.open_cursor(&query)).await?;
        let mut sent = 0usize;

        while sent < limit {
            let n = self.read_batch.min(limit - sent);
            let (returned, batch) = blocking(move || {
                let batch = cursor.fetch(n);
                Ok((cursor, batch))
            })
            .await?;
            cursor = returned;
            let rows = batch?;
            if rows.is_empty() {
                break;
            }

            let mut buf = Vec::with_capacity(rows.len() * 128);
            for row in &rows {
                encode_line(row, &mut buf)?;
            }
            sent += rows.len();
            if self.tx.send(Bytes::from(buf)).await.is_err() {
                return Ok(None);
            }
            if rows.len() < n {
                break;
            }
        }
        Ok(Some(sent as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct NoTables;

    impl RowStore for NoTables {
        fn columns(&self, table: &str) -> Result<Vec<crate::types::Column>> {
            Err(Error::TableNotFound(table.to_string()))
        }
        fn count(&self, _: &CompiledQuery) -> Result<u64> {
            Ok(0)
        }
        fn open_cursor(&self, _: &CompiledQuery) -> Result<Box<dyn RowCursor>> {
            Ok(Box::new(crate::store::VecCursor::new(vec![])))
        }
        fn begin_bulk(&self, table: &str, _: crate::store::BulkOptions) -> Result<Box<dyn crate::store::BulkTxn>> {
            Err(Error::TableNotFound(table.to_string()))
        }
        fn row_count(&self, _: &str) -> Result<u64> {
            Ok(0)
        }
    }

    fn executor() -> StreamExecutor {
        StreamExecutor::new(
            Arc::new(NoTables),
            ConnectionPool::new(1, Duration::from_millis(20)),
            QueryConfig::default(),
        )
    }

    #[test]
    fn test_resolve_limit() {
        let exec = executor();
        assert_eq!(exec.resolve_limit(None).unwrap(), 200);
        assert_eq!(exec.resolve_limit(Some(1000)).unwrap(), 1000);
        assert!(exec.resolve_limit(Some(0)).unwrap_err().is_validation());
        assert!(exec.resolve_limit(Some(1001)).unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_validation_holds_no_connection() {
        let exec = executor();
        let req = PageRequest::default().limit(5000);
        assert!(exec.stream("t", &req).await.is_err());
        assert_eq!(exec.pool().available(), 1);
    }
}

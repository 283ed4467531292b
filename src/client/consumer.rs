//! Client stream consumer
//!
//! Accumulates pages streamed from a `PageSource` into a growing row list,
//! the way an infinite-scrolling grid consumes them. Records are decoded
//! incrementally and merged in batches; a fetch that has been superseded by
//! `reset` never merges anything.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;

use super::source::PageSource;
use crate::query::derive_cursor;
use crate::stream::{LineDecoder, StreamRecord};
use crate::types::{Cursor, PageRequest, Row};

pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

/// What a call to `fetch_next_page` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A fetch was already running, or everything is loaded.
    Skipped,
    /// Page merged; carries the number of rows it added.
    Loaded(usize),
    /// A `reset` started a newer fetch; this one's results were discarded.
    Superseded,
    /// The fetch failed; the message is also in `error`.
    Failed(String),
}

/// Point-in-time view of the consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSnapshot {
    pub rows: Vec<Row>,
    pub total_rows: Option<u64>,
    pub loaded_rows: usize,
    pub loading: bool,
    pub error: Option<String>,
    pub has_more: bool,
}

#[derive(Default)]
struct State {
    /// Search, filters and sort; the cursor lives in `cursor`.
    query: PageRequest,
    rows: Vec<Row>,
    total_rows: Option<u64>,
    /// Starts as the caller's cursor; cleared by `reset`.
    cursor: Option<Cursor>,
    loading: bool,
    error: Option<String>,
    generation: u64,
    /// Last page came back empty.
    exhausted: bool,
}

impl State {
    fn has_more(&self) -> bool {
        !self.exhausted && self.total_rows.map_or(true, |t| (self.rows.len() as u64) < t)
    }
}

struct Inner {
    source: Arc<dyn PageSource>,
    table: String,
    flush_threshold: usize,
    state: Mutex<State>,
}

#[derive(Clone)]
pub struct StreamConsumer {
    inner: Arc<Inner>,
}

impl StreamConsumer {
    /// `query.cursor`, if set, is used for the first fetch only.
    pub fn new(source: Arc<dyn PageSource>, table: &str, query: PageRequest) -> Self {
        Self::with_flush_threshold(source, table, query, DEFAULT_FLUSH_THRESHOLD)
    }

    /// Like `new`, merging decoded rows every `flush_threshold` records.
    pub fn with_flush_threshold(
        source: Arc<dyn PageSource>,
        table: &str,
        mut query: PageRequest,
        flush_threshold: usize,
    ) -> Self {
        let cursor = query.cursor.take();
        Self {
            inner: Arc::new(Inner {
                source,
                table: table.to_string(),
                flush_threshold: flush_threshold.max(1),
                state: Mutex::new(State { query, cursor, ..Default::default() }),
            }),
        }
    }

    pub fn total_rows(&self) -> Option<u64> {
        self.inner.state.lock().total_rows
    }

    pub fn loaded_rows(&self) -> usize {
        self.inner.state.lock().rows.len()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn has_more(&self) -> bool {
        self.inner.state.lock().has_more()
    }

    /// Run `f` over the loaded rows without cloning them.
    pub fn with_rows<R>(&self, f: impl FnOnce(&[Row]) -> R) -> R {
        f(&self.inner.state.lock().rows)
    }

    pub fn snapshot(&self) -> ConsumerSnapshot {
        let s = self.inner.state.lock();
        ConsumerSnapshot {
            rows: s.rows.clone(),
            total_rows: s.total_rows,
            loaded_rows: s.rows.len(),
            loading: s.loading,
            error: s.error.clone(),
            has_more: s.has_more(),
        }
    }

    /// Load the next page after the local cursor. Ignored while a fetch is
    /// running or once everything has been loaded.
    pub async fn fetch_next_page(&self) -> FetchOutcome {
        let (generation, request) = {
            let mut s = self.inner.state.lock();
            if s.loading || !s.has_more() {
                return FetchOutcome::Skipped;
            }
            s.loading = true;
            s.error = None;
            let mut request = s.query.clone();
            request.cursor = s.cursor.clone();
            (s.generation, request)
        };

        let outcome = self.run_fetch(generation, &request).await;

        let mut s = self.inner.state.lock();
        if s.generation != generation {
            return FetchOutcome::Superseded;
        }
        s.loading = false;
        if let FetchOutcome::Failed(message) = &outcome {
            tracing::debug!(table = %self.inner.table, error = %message, "page fetch failed");
            s.error = Some(message.clone());
        }
        outcome
    }

    /// Clear everything and fetch the first page again.
    pub async fn reset(&self) -> FetchOutcome {
        {
            let mut s = self.inner.state.lock();
            s.generation += 1;
            s.rows.clear();
            s.total_rows = None;
            s.cursor = None;
            s.error = None;
            s.loading = false;
            s.exhausted = false;
        }
        self.fetch_next_page().await
    }

    /// Replace search, filters and sort, then reset.
    pub async fn set_query(&self, mut query: PageRequest) -> FetchOutcome {
        query.cursor = None;
        self.inner.state.lock().query = query;
        self.reset().await
    }

    async fn run_fetch(&self, generation: u64, request: &PageRequest) -> FetchOutcome {
        let mut stream = match self.inner.source.open(&self.inner.table, request).await {
            Ok(s) => s,
            Err(e) => return FetchOutcome::Failed(e.to_string()),
        };

        let mut page = Page::new(self, generation, &request.sort_col);
        let mut decoder = LineDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => return page.finish(Some(e.to_string())),
            };
            for record in decoder.push(&chunk) {
                if let Some(outcome) = page.accept(record) {
                    return outcome;
                }
            }
        }
        if let Some(record) = decoder.finish() {
            if let Some(outcome) = page.accept(record) {
                return outcome;
            }
        }
        page.finish(None)
    }
}

/// Records of one fetch that have not been merged yet.
struct Page<'a> {
    consumer: &'a StreamConsumer,
    generation: u64,
    sort_col: &'a str,
    pending: Vec<Row>,
    cursor: Option<Cursor>,
    added: usize,
}

impl<'a> Page<'a> {
    fn new(consumer: &'a StreamConsumer, generation: u64, sort_col: &'a str) -> Self {
        Self { consumer, generation, sort_col, pending: Vec::new(), cursor: None, added: 0 }
    }

    /// Handle one record; `Some` ends the fetch.
    fn accept(&mut self, record: crate::error::Result<StreamRecord>) -> Option<FetchOutcome> {
        match record {
            Ok(StreamRecord::Header { total_rows }) => {
                let mut s = self.consumer.inner.state.lock();
                if s.generation != self.generation {
                    return Some(FetchOutcome::Superseded);
                }
                s.total_rows = Some(total_rows);
                None
            }
            Ok(StreamRecord::Row(row)) => {
                self.cursor = Some(derive_cursor(&row, self.sort_col));
                self.pending.push(row);
                if self.pending.len() >= self.consumer.inner.flush_threshold && !self.flush() {
                    return Some(FetchOutcome::Superseded);
                }
                None
            }
            Ok(StreamRecord::Error { error }) => Some(self.finish(Some(error))),
            Err(e) => Some(self.finish(Some(format!("malformed stream record: {}", e)))),
        }
    }

    /// Merge pending rows; `false` if this fetch has been superseded.
    fn flush(&mut self) -> bool {
        let mut s = self.consumer.inner.state.lock();
        if s.generation != self.generation {
            return false;
        }
        self.added += self.pending.len();
        s.rows.append(&mut self.pending);
        if let Some(cursor) = self.cursor.take() {
            s.cursor = Some(cursor);
        }
        true
    }

    fn finish(&mut self, error: Option<String>) -> FetchOutcome {
        if !self.flush() {
            return FetchOutcome::Superseded;
        }
        match error {
            Some(message) => FetchOutcome::Failed(message),
            None => {
                if self.added == 0 {
                    self.consumer.inner.state.lock().exhausted = true;
                }
                FetchOutcome::Loaded(self.added)
            }
        }
    }
}

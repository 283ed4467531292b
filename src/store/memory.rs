//! Embedded in-memory row store
//!
//! Tables live in a `DashMap`, rows in a per-table `BTreeMap` keyed by row id.
//! Every mutation is written to the WAL before it is applied; `open` replays
//! the log to rebuild state.
//!
//! # Example
//! ```ignore
//! use sheetgrid::store::MemoryRowStore;
//! use sheetgrid::types::{ColumnSpec, DataType};
//!
//! let store = MemoryRowStore::in_memory();
//! store.create_table("people", vec![ColumnSpec::new("age", DataType::Numeric)])?;
//! store.insert_row("people", serde_json::json!({"age": 30}).as_object().cloned().unwrap())?;
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::table::{check_row, check_value, StoredRow, Table};
use super::{BulkOptions, BulkTxn, RowCursor, RowStore};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::query::{BoundQuery, CompiledQuery, RowKey, SortTarget};
use crate::txn::{CommitMode, Transaction, TxnManager};
use crate::types::{Column, ColumnSpec, DataType, Row, RowData, RowId, SortDir, ROW_ID_COLUMN};
use crate::wal::{WalConfig, WalEntry, WalOp, WriteAheadLog};

struct StoreInner {
    tables: DashMap<String, Arc<Table>>,
    next_row_id: AtomicU64,
    next_column_id: AtomicU64,
    txn: TxnManager,
    wal: Arc<dyn WriteAheadLog>,
}

/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct MemoryRowStore {
    inner: Arc<StoreInner>,
}

impl MemoryRowStore {
    /// Volatile store without a WAL.
    pub fn in_memory() -> Self {
        Self::from_wal(Arc::new(crate::wal::NoOpWal::new()))
    }

    /// Open (or create) the store described by `config`, replaying its WAL.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let wal = WalConfig::new(config.wal_mode)
            .path(&config.data_dir)
            .group_commit_ms(config.group_commit_ms)
            .build()?;
        Self::with_wal(wal)
    }

    /// Wrap an existing WAL and replay it.
    pub fn with_wal(wal: Arc<dyn WriteAheadLog>) -> Result<Self> {
        let store = Self::from_wal(wal);
        store.replay()?;
        Ok(store)
    }

    fn from_wal(wal: Arc<dyn WriteAheadLog>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tables: DashMap::new(),
                next_row_id: AtomicU64::new(1),
                next_column_id: AtomicU64::new(1),
                txn: TxnManager::new(),
                wal,
            }),
        }
    }

    // ============ WAL ============

    fn log(&self, ops: Vec<WalOp>, mode: CommitMode) -> Result<()> {
        let wal = &self.inner.wal;
        if !wal.is_enabled() {
            return Ok(());
        }
        let entries: Vec<WalEntry> = ops.into_iter().map(WalEntry::new).collect();
        wal.append_batch(&entries)?;
        if mode == CommitMode::Sync && wal.sync_on_commit() {
            wal.sync()?;
        }
        Ok(())
    }

    fn put_op(table: &str, row: &Row) -> Result<WalOp> {
        Ok(WalOp::PutRow {
            table: table.to_string(),
            row_id: row.row_id.0,
            data: serde_json::to_string(&row.data)?,
            created_at_us: row.created_at.timestamp_micros(),
            updated_at_us: row.updated_at.timestamp_micros(),
        })
    }

    fn replay(&self) -> Result<()> {
        let entries = self.inner.wal.replay_from(0)?;
        if entries.is_empty() {
            return Ok(());
        }
        let total = entries.len();
        let mut bulk: Option<(u64, Vec<WalOp>)> = None;

        for entry in entries {
            match entry.op {
                WalOp::BeginBulk { txn } => bulk = Some((txn, Vec::new())),
                WalOp::CommitBulk { txn } => match bulk.take() {
                    Some((open, ops)) if open == txn => {
                        for op in ops {
                            self.apply(op)?;
                        }
                    }
                    _ => tracing::warn!(txn, "wal commit marker without matching begin"),
                },
                op => match bulk.as_mut() {
                    Some((_, ops)) => ops.push(op),
                    None => self.apply(op)?,
                },
            }
        }
        if let Some((txn, ops)) = bulk {
            tracing::warn!(txn, rows = ops.len(), "discarding uncommitted bulk load from wal");
        }
        tracing::info!(entries = total, tables = self.inner.tables.len(), "wal replayed");
        Ok(())
    }

    /// Apply a logged operation without logging it again.
    fn apply(&self, op: WalOp) -> Result<()> {
        match op {
            WalOp::CreateTable { table, columns } => {
                self.apply_create_table(&table, columns)?;
            }
            WalOp::AddColumn { table, column } => {
                self.apply_add_column(&table, column)?;
            }
            WalOp::DropColumn { table, name } => self.apply_drop_column(&table, &name)?,
            WalOp::RenameColumn { table, from, to } => {
                self.apply_rename_column(&table, &from, &to)?;
            }
            WalOp::SetColumnType { table, column } => {
                self.apply_set_column_type(&table, &column.name, column.data_type)?;
            }
            WalOp::PutRow { table, row_id, data, created_at_us, updated_at_us } => {
                let row = Row {
                    row_id: RowId(row_id),
                    table_id: table.clone(),
                    data: serde_json::from_str(&data)?,
                    created_at: DateTime::<Utc>::from_timestamp_micros(created_at_us).unwrap_or_default(),
                    updated_at: DateTime::<Utc>::from_timestamp_micros(updated_at_us).unwrap_or_default(),
                };
                self.inner.next_row_id.fetch_max(row_id + 1, Ordering::SeqCst);
                let t = self.table(&table)?;
                let columns = t.columns.read();
                t.put(&columns, row);
            }
            WalOp::DeleteRow { table, row_id } => {
                self.table(&table)?.remove(RowId(row_id));
            }
            WalOp::BeginBulk { .. } | WalOp::CommitBulk { .. } => {}
        }
        Ok(())
    }

    // ============ TABLES & COLUMNS ============

    fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.inner
            .tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn next_column_id(&self) -> u64 {
        self.inner.next_column_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_column_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::validation("column name must not be empty"));
        }
        if name == ROW_ID_COLUMN {
            return Err(Error::validation(format!("'{}' is reserved", ROW_ID_COLUMN)));
        }
        Ok(())
    }

    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnSpec>) -> Result<Vec<Column>> {
        if name.trim().is_empty() {
            return Err(Error::validation("table name must not be empty"));
        }
        if self.inner.tables.contains_key(name) {
            return Err(Error::TableExists(name.to_string()));
        }
        for (i, spec) in columns.iter().enumerate() {
            Self::check_column_name(&spec.name)?;
            if columns[..i].iter().any(|c| c.name == spec.name) {
                return Err(Error::ColumnExists(spec.name.clone()));
            }
        }
        self.log(vec![WalOp::CreateTable { table: name.to_string(), columns: columns.clone() }], CommitMode::Sync)?;
        let created = self.apply_create_table(name, columns)?;
        tracing::info!(table = name, columns = created.len(), "table created");
        Ok(created)
    }

    fn apply_create_table(&self, name: &str, specs: Vec<ColumnSpec>) -> Result<Vec<Column>> {
        let columns: Vec<Column> = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Column {
                id: self.next_column_id(),
                name: spec.name,
                data_type: spec.data_type,
                position: i as u32,
            })
            .collect();
        match self.inner.tables.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::TableExists(name.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Table::new(name, columns.clone())));
                Ok(columns)
            }
        }
    }

    pub fn add_column(&self, table: &str, spec: ColumnSpec) -> Result<Column> {
        Self::check_column_name(&spec.name)?;
        let t = self.table(table)?;
        if t.columns.read().iter().any(|c| c.name == spec.name) {
            return Err(Error::ColumnExists(spec.name));
        }
        self.log(vec![WalOp::AddColumn { table: table.to_string(), column: spec.clone() }], CommitMode::Sync)?;
        self.apply_add_column(table, spec)
    }

    fn apply_add_column(&self, table: &str, spec: ColumnSpec) -> Result<Column> {
        let t = self.table(table)?;
        let mut columns = t.columns.write();
        if columns.iter().any(|c| c.name == spec.name) {
            return Err(Error::ColumnExists(spec.name));
        }
        let column = Column {
            id: self.next_column_id(),
            name: spec.name,
            data_type: spec.data_type,
            position: columns.iter().map(|c| c.position + 1).max().unwrap_or(0),
        };
        columns.push(column.clone());
        Ok(column)
    }

    /// Remove a column and its key from every row.
    pub fn drop_column(&self, table: &str, name: &str) -> Result<()> {
        let t = self.table(table)?;
        if !t.columns.read().iter().any(|c| c.name == name) {
            return Err(Error::UnknownColumn(name.to_string()));
        }
        self.log(vec![WalOp::DropColumn { table: table.to_string(), name: name.to_string() }], CommitMode::Sync)?;
        self.apply_drop_column(table, name)
    }

    fn apply_drop_column(&self, table: &str, name: &str) -> Result<()> {
        let t = self.table(table)?;
        let mut columns = t.columns.write();
        let before = columns.len();
        columns.retain(|c| c.name != name);
        if columns.len() == before {
            return Err(Error::UnknownColumn(name.to_string()));
        }
        for (i, c) in columns.iter_mut().enumerate() {
            c.position = i as u32;
        }
        t.rewrite_rows(&columns, |data| {
            data.remove(name);
        });
        Ok(())
    }

    pub fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<Column> {
        Self::check_column_name(to)?;
        let t = self.table(table)?;
        {
            let columns = t.columns.read();
            if !columns.iter().any(|c| c.name == from) {
                return Err(Error::UnknownColumn(from.to_string()));
            }
            if columns.iter().any(|c| c.name == to) {
                return Err(Error::ColumnExists(to.to_string()));
            }
        }
        self.log(
            vec![WalOp::RenameColumn { table: table.to_string(), from: from.to_string(), to: to.to_string() }],
            CommitMode::Sync,
        )?;
        self.apply_rename_column(table, from, to)
    }

    fn apply_rename_column(&self, table: &str, from: &str, to: &str) -> Result<Column> {
        let t = self.table(table)?;
        let mut columns = t.columns.write();
        let column = columns
            .iter_mut()
            .find(|c| c.name == from)
            .ok_or_else(|| Error::UnknownColumn(from.to_string()))?;
        column.name = to.to_string();
        let renamed = column.clone();
        t.rewrite_rows(&columns, |data| {
            if let Some(v) = data.remove(from) {
                data.insert(to.to_string(), v);
            }
        });
        Ok(renamed)
    }

    /// Change a column's declared type. Stored values are kept as they are;
    /// reads that cannot cast them fail with `TypeMismatch`.
    pub fn set_column_type(&self, table: &str, name: &str, data_type: DataType) -> Result<Column> {
        let t = self.table(table)?;
        if !t.columns.read().iter().any(|c| c.name == name) {
            return Err(Error::UnknownColumn(name.to_string()));
        }
        self.log(
            vec![WalOp::SetColumnType { table: table.to_string(), column: ColumnSpec::new(name, data_type) }],
            CommitMode::Sync,
        )?;
        self.apply_set_column_type(table, name, data_type)
    }

    fn apply_set_column_type(&self, table: &str, name: &str, data_type: DataType) -> Result<Column> {
        let t = self.table(table)?;
        let mut columns = t.columns.write();
        let column = columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))?;
        column.data_type = data_type;
        let changed = column.clone();
        // Text columns feed the search vectors.
        t.rewrite_rows(&columns, |_| {});
        Ok(changed)
    }

    // ============ ROWS ============

    fn next_row_id(&self) -> RowId {
        RowId(self.inner.next_row_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn insert_row(&self, table: &str, data: RowData) -> Result<Row> {
        let t = self.table(table)?;
        let columns = t.columns.read();
        let data = check_row(&columns, data, None)?;
        let now = Utc::now();
        let row = Row {
            row_id: self.next_row_id(),
            table_id: table.to_string(),
            data,
            created_at: now,
            updated_at: now,
        };
        self.log(vec![Self::put_op(table, &row)?], CommitMode::Sync)?;
        t.put(&columns, row.clone());
        self.inner.txn.autocommit();
        Ok(row)
    }

    /// Merge `patch` into a row. Null or empty values clear cells.
    pub fn update_row(&self, table: &str, row_id: RowId, patch: RowData) -> Result<Row> {
        let t = self.table(table)?;
        let columns = t.columns.read();
        let current = t.get(row_id).ok_or(Error::RowNotFound(row_id))?;
        let mut row = current.row.clone();
        for (name, value) in patch {
            let column = columns
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
            match check_value(column, value, Some(row_id))? {
                Some(v) => row.data.insert(name, v),
                None => row.data.remove(&name),
            };
        }
        row.updated_at = Utc::now();
        self.log(vec![Self::put_op(table, &row)?], CommitMode::Sync)?;
        t.put(&columns, row.clone());
        self.inner.txn.autocommit();
        Ok(row)
    }

    pub fn delete_row(&self, table: &str, row_id: RowId) -> Result<()> {
        let t = self.table(table)?;
        if t.get(row_id).is_none() {
            return Err(Error::RowNotFound(row_id));
        }
        self.log(vec![WalOp::DeleteRow { table: table.to_string(), row_id: row_id.0 }], CommitMode::Sync)?;
        t.remove(row_id);
        self.inner.txn.autocommit();
        Ok(())
    }

    pub fn get_row(&self, table: &str, row_id: RowId) -> Result<Row> {
        self.table(table)?
            .get(row_id)
            .map(|s| s.row.clone())
            .ok_or(Error::RowNotFound(row_id))
    }

    /// Flush and fsync the WAL.
    pub fn sync(&self) -> Result<()> {
        self.inner.wal.sync()
    }

    /// Bumped by every committed write.
    pub fn version(&self) -> u64 {
        self.inner.txn.current_version()
    }

    pub fn active_transactions(&self) -> usize {
        self.inner.txn.active_count()
    }

    /// Whether `table`'s search index is currently serving lookups.
    pub fn search_index_live(&self, table: &str) -> Result<bool> {
        Ok(self.table(table)?.search.is_live())
    }

    // ============ QUERIES ============

    /// Rows that could match: search-index hits when the index is live and
    /// the query searches, otherwise every row.
    fn candidates(table: &Table, bound: &BoundQuery<'_>) -> Vec<Arc<StoredRow>> {
        let rows = table.rows.read();
        if let Some(tokens) = bound.search_tokens() {
            if let Some(hits) = table.search.lookup(tokens) {
                return hits.iter().filter_map(|id| rows.get(&RowId(id)).cloned()).collect();
            }
        }
        rows.values().cloned().collect()
    }

    #[cfg(feature = "parallel")]
    fn count_matching(rows: &[Arc<StoredRow>], bound: &BoundQuery<'_>) -> Result<u64> {
        use rayon::prelude::*;
        let hits: Vec<bool> = rows
            .par_iter()
            .map(|r| bound.matches_filter(&r.row, &r.vector))
            .collect::<Result<_>>()?;
        Ok(hits.into_iter().filter(|&m| m).count() as u64)
    }

    #[cfg(not(feature = "parallel"))]
    fn count_matching(rows: &[Arc<StoredRow>], bound: &BoundQuery<'_>) -> Result<u64> {
        let mut n = 0;
        for r in rows {
            if bound.matches_filter(&r.row, &r.vector)? {
                n += 1;
            }
        }
        Ok(n)
    }

    #[cfg(feature = "parallel")]
    fn keyed_matches(rows: Vec<Arc<StoredRow>>, bound: &BoundQuery<'_>) -> Result<Vec<(RowKey, Arc<StoredRow>)>> {
        use rayon::prelude::*;
        let keyed: Vec<Option<(RowKey, Arc<StoredRow>)>> = rows
            .into_par_iter()
            .map(|r| Self::keyed_match(r, bound))
            .collect::<Result<_>>()?;
        Ok(keyed.into_iter().flatten().collect())
    }

    #[cfg(not(feature = "parallel"))]
    fn keyed_matches(rows: Vec<Arc<StoredRow>>, bound: &BoundQuery<'_>) -> Result<Vec<(RowKey, Arc<StoredRow>)>> {
        let mut keyed = Vec::new();
        for r in rows {
            if let Some(k) = Self::keyed_match(r, bound)? {
                keyed.push(k);
            }
        }
        Ok(keyed)
    }

    fn keyed_match(r: Arc<StoredRow>, bound: &BoundQuery<'_>) -> Result<Option<(RowKey, Arc<StoredRow>)>> {
        if bound.matches(&r.row, &r.vector)? {
            Ok(Some((bound.row_key(&r.row)?, r)))
        } else {
            Ok(None)
        }
    }

    /// Row-id order walks the BTreeMap from the cursor and stops at `limit`.
    fn select_by_row_id(table: &Table, bound: &BoundQuery<'_>, dir: SortDir, limit: usize) -> Result<Vec<Arc<StoredRow>>> {
        let after = bound.after().map(|k| k.id);
        let rows = table.rows.read();
        let iter: Box<dyn Iterator<Item = &Arc<StoredRow>>> = match (dir, after) {
            (SortDir::Asc, Some(id)) => Box::new(rows.range((Bound::Excluded(id), Bound::Unbounded)).map(|(_, r)| r)),
            (SortDir::Asc, None) => Box::new(rows.values()),
            (SortDir::Desc, Some(id)) => Box::new(rows.range(..id).rev().map(|(_, r)| r)),
            (SortDir::Desc, None) => Box::new(rows.values().rev()),
        };
        let mut page = Vec::with_capacity(limit.min(1024));
        for r in iter {
            if page.len() >= limit {
                break;
            }
            if bound.matches_filter(&r.row, &r.vector)? {
                page.push(Arc::clone(r));
            }
        }
        Ok(page)
    }

    fn select(&self, query: &CompiledQuery) -> Result<Vec<Arc<StoredRow>>> {
        let table = self.table(&query.table)?;
        let bound = BoundQuery::bind(query)?;
        let limit = query.limit;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let index_hits = bound.search_tokens().is_some() && table.search.is_live();
        if query.order.target == SortTarget::RowId && !index_hits {
            return Self::select_by_row_id(&table, &bound, query.order.dir, limit);
        }

        let mut keyed = Self::keyed_matches(Self::candidates(&table, &bound), &bound)?;
        if keyed.len() > limit {
            keyed.select_nth_unstable_by(limit - 1, |a, b| bound.compare(&a.0, &b.0));
            keyed.truncate(limit);
        }
        keyed.sort_unstable_by(|a, b| bound.compare(&a.0, &b.0));
        Ok(keyed.into_iter().map(|(_, r)| r).collect())
    }
}

/// Cursor over a page snapshot; rows are cloned out on fetch.
struct SnapshotCursor {
    rows: std::vec::IntoIter<Arc<StoredRow>>,
}

impl RowCursor for SnapshotCursor {
    fn fetch(&mut self, n: usize) -> Result<Vec<Row>> {
        Ok(self.rows.by_ref().take(n).map(|s| s.row.clone()).collect())
    }
}

impl RowStore for MemoryRowStore {
    fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let mut columns = self.table(table)?.columns.read().clone();
        columns.sort_by_key(|c| c.position);
        Ok(columns)
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64> {
        let table = self.table(&query.table)?;
        let bound = BoundQuery::bind(query)?;
        if query.predicate.is_empty() {
            return Ok(table.len());
        }
        Self::count_matching(&Self::candidates(&table, &bound), &bound)
    }

    fn open_cursor(&self, query: &CompiledQuery) -> Result<Box<dyn RowCursor>> {
        let rows = self.select(query)?;
        Ok(Box::new(SnapshotCursor { rows: rows.into_iter() }))
    }

    fn begin_bulk(&self, table: &str, options: BulkOptions) -> Result<Box<dyn BulkTxn>> {
        let t = self.table(table)?;
        let columns = self.columns(table)?;
        let txn = self.inner.txn.begin(options.commit_mode);
        if options.suspend_indexes {
            t.search.suspend();
        }
        tracing::debug!(table, txn = txn.id, suspend_indexes = options.suspend_indexes, "bulk transaction opened");
        Ok(Box::new(MemoryBulkTxn {
            store: self.clone(),
            table: t,
            columns,
            txn,
            staged: Vec::new(),
            suspended: options.suspend_indexes,
        }))
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        Ok(self.table(table)?.len())
    }
}

/// Bulk transaction that stages rows privately until commit.
pub struct MemoryBulkTxn {
    store: MemoryRowStore,
    table: Arc<Table>,
    columns: Vec<Column>,
    txn: Transaction,
    staged: Vec<Row>,
    /// This transaction holds a suspension of the search index.
    suspended: bool,
}

impl MemoryBulkTxn {
    fn release_index(&mut self) {
        if std::mem::take(&mut self.suspended) {
            self.table.resume_search();
        }
    }
}

impl BulkTxn for MemoryBulkTxn {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn append(&mut self, rows: Vec<RowData>) -> Result<u64> {
        if !self.txn.is_active() {
            return Err(Error::validation("bulk transaction is closed"));
        }
        let now = Utc::now();
        self.staged.reserve(rows.len());
        let appended = rows.len();
        for data in rows {
            let data = check_row(&self.columns, data, None)?;
            self.staged.push(Row {
                row_id: self.store.next_row_id(),
                table_id: self.table.name.clone(),
                data,
                created_at: now,
                updated_at: now,
            });
        }
        self.txn.record_writes(appended);
        Ok(self.txn.writes)
    }

    fn commit(mut self: Box<Self>) -> Result<u64> {
        let columns = self.table.columns.read();
        let mut current = columns.clone();
        current.sort_by_key(|c| c.position);
        if current != self.columns {
            drop(columns);
            return Err(Error::validation(format!(
                "columns of '{}' changed during the bulk load",
                self.table.name
            )));
        }

        let staged = std::mem::take(&mut self.staged);
        if self.store.inner.wal.is_enabled() {
            let mut ops = Vec::with_capacity(staged.len() + 2);
            ops.push(WalOp::BeginBulk { txn: self.txn.id });
            for row in &staged {
                ops.push(MemoryRowStore::put_op(&self.table.name, row)?);
            }
            ops.push(WalOp::CommitBulk { txn: self.txn.id });
            self.store.log(ops, self.txn.commit_mode)?;
        }

        let resume = std::mem::take(&mut self.suspended);
        let committed = self.table.put_many(&columns, staged, resume);
        drop(columns);
        self.store.inner.txn.commit(&mut self.txn)?;
        tracing::debug!(table = %self.table.name, txn = self.txn.id, rows = committed, "bulk transaction committed");
        Ok(committed)
    }

    fn rollback(self: Box<Self>) {
        // Drop does the work.
    }
}

impl Drop for MemoryBulkTxn {
    fn drop(&mut self) {
        if self.txn.is_active() {
            self.store.inner.txn.rollback(&mut self.txn);
            tracing::warn!(
                table = %self.table.name,
                txn = self.txn.id,
                discarded = self.staged.len(),
                "bulk transaction rolled back"
            );
        }
        self.staged.clear();
        self.release_index();
    }
}

//! Per-table state: columns, committed rows, search index.
//!
//! Lock order is always `columns` before `rows`. The search index is only
//! mutated while `rows` is write-locked, so a reader holding `rows` sees
//! postings that agree with the rows.

use parking_lot::RwLock;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::index::{SearchIndex, SearchVector};
use crate::query::coerce;
use crate::types::{Column, DataType, Row, RowData, RowId};

pub(crate) struct StoredRow {
    pub row: Row,
    pub vector: SearchVector,
}

pub(crate) struct Table {
    pub name: String,
    pub columns: RwLock<Vec<Column>>,
    pub rows: RwLock<BTreeMap<RowId, Arc<StoredRow>>>,
    pub search: SearchIndex,
}

impl Table {
    pub fn new(name: &str, columns: Vec<Column>) -> Self {
        Self {
            name: name.to_string(),
            columns: RwLock::new(columns),
            rows: RwLock::new(BTreeMap::new()),
            search: SearchIndex::new(),
        }
    }

    pub fn vectorize(columns: &[Column], data: &RowData) -> SearchVector {
        let text_columns = columns
            .iter()
            .filter(|c| c.data_type == DataType::Text)
            .map(|c| c.name.as_str());
        SearchVector::from_row(data, text_columns)
    }

    /// Insert or replace one row. Caller holds `columns` at least for read.
    pub fn put(&self, columns: &[Column], row: Row) -> Arc<StoredRow> {
        let vector = Self::vectorize(columns, &row.data);
        let stored = Arc::new(StoredRow { row, vector });
        let mut rows = self.rows.write();
        if let Some(old) = rows.insert(stored.row.row_id, Arc::clone(&stored)) {
            self.search.remove(old.row.row_id, &old.vector);
        }
        self.search.insert(stored.row.row_id, &stored.vector);
        stored
    }

    /// Publish many rows under one write lock. Optionally resumes a
    /// suspended search index, which rebuilds it.
    pub fn put_many(&self, columns: &[Column], rows_in: Vec<Row>, resume_search: bool) -> u64 {
        let stored: Vec<Arc<StoredRow>> = rows_in
            .into_iter()
            .map(|row| {
                let vector = Self::vectorize(columns, &row.data);
                Arc::new(StoredRow { row, vector })
            })
            .collect();
        let n = stored.len() as u64;

        let mut rows = self.rows.write();
        for s in stored {
            if let Some(old) = rows.insert(s.row.row_id, Arc::clone(&s)) {
                self.search.remove(old.row.row_id, &old.vector);
            }
            self.search.insert(s.row.row_id, &s.vector);
        }
        if resume_search {
            self.search.resume(rows.iter().map(|(id, r)| (*id, &r.vector)));
        }
        n
    }

    pub fn remove(&self, row_id: RowId) -> Option<Arc<StoredRow>> {
        let mut rows = self.rows.write();
        let old = rows.remove(&row_id)?;
        self.search.remove(row_id, &old.vector);
        Some(old)
    }

    pub fn resume_search(&self) {
        let rows = self.rows.write();
        self.search.resume(rows.iter().map(|(id, r)| (*id, &r.vector)));
    }

    /// Apply `edit` to every row's data and recompute search vectors.
    /// Caller holds `columns` for write and passes the new column list.
    pub fn rewrite_rows(&self, columns: &[Column], mut edit: impl FnMut(&mut RowData)) {
        let mut rows = self.rows.write();
        for stored in rows.values_mut() {
            let mut row = stored.row.clone();
            edit(&mut row.data);
            let vector = Self::vectorize(columns, &row.data);
            *stored = Arc::new(StoredRow { row, vector });
        }
        self.search.rebuild(rows.iter().map(|(id, r)| (*id, &r.vector)));
    }

    pub fn get(&self, row_id: RowId) -> Option<Arc<StoredRow>> {
        self.rows.read().get(&row_id).cloned()
    }

    pub fn len(&self) -> u64 {
        self.rows.read().len() as u64
    }
}

/// Type-check one cell. `Ok(None)` clears the cell.
///
/// Numeric and boolean strings are normalized to JSON numbers and booleans.
/// An empty string clears a non-text cell.
pub fn check_value(column: &Column, value: Value, row_id: Option<RowId>) -> Result<Option<Value>> {
    let mismatch = |found: &Value| Error::TypeMismatch {
        row_id,
        column: column.name.clone(),
        expected: column.data_type,
        found: found.to_string(),
    };

    match (&value, column.data_type) {
        (Value::Null, _) => Ok(None),
        (Value::String(s), dt) if s.is_empty() && dt != DataType::Text => Ok(None),
        (Value::String(_), DataType::Text) => Ok(Some(value)),
        (Value::Number(_), DataType::Numeric) => Ok(Some(value)),
        (Value::String(s), DataType::Numeric) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(Some(Value::Number(i.into()))),
            Err(_) => coerce::parse_number(&value)
                .and_then(Number::from_f64)
                .map(|n| Some(Value::Number(n)))
                .ok_or_else(|| mismatch(&value)),
        },
        (Value::Bool(_), DataType::Boolean) => Ok(Some(value)),
        (Value::String(_), DataType::Boolean) => coerce::parse_bool(&value)
            .map(|b| Some(Value::Bool(b)))
            .ok_or_else(|| mismatch(&value)),
        (Value::String(s), DataType::Date) if coerce::parse_timestamp(s).is_some() => Ok(Some(value)),
        _ => Err(mismatch(&value)),
    }
}

/// Validate a full row against `columns`, dropping cleared cells.
pub fn check_row(columns: &[Column], data: RowData, row_id: Option<RowId>) -> Result<RowData> {
    let mut out = RowData::new();
    for (name, value) in data {
        let column = columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
        if let Some(v) = check_value(column, value, row_id)? {
            out.insert(name, v);
        }
    }
    Ok(out)
}

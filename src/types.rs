use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Sort column name that selects the row id itself.
pub const ROW_ID_COLUMN: &str = "rowId";

/// Cell values keyed by column name. Absent keys mean "no value".
pub type RowData = Map<String, Value>;

// ============ COLUMNS ============

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Numeric,
    Boolean,
    Date,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Text => "text",
            DataType::Numeric => "numeric",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: u64,
    pub name: String,
    pub data_type: DataType,
    pub position: u32,
}

/// Column definition as supplied by a caller, before an id is assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSpec {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self { name: name.to_string(), data_type }
    }
}

// ============ ROWS ============

/// Stable row identifier. Monotonic within a store, carried on the wire as a
/// decimal string so clients treat it as opaque.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(RowId)
            .map_err(|_| Error::validation(format!("malformed row id '{}'", s)))
    }
}

impl Serialize for RowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Accept both "42" and 42; clients written against other backends send numbers.
        match Value::deserialize(deserializer)? {
            Value::String(s) => s.parse().map_err(serde::de::Error::custom),
            Value::Number(n) => n
                .as_u64()
                .map(RowId)
                .ok_or_else(|| serde::de::Error::custom("row id must be a non-negative integer")),
            other => Err(serde::de::Error::custom(format!("invalid row id {}", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub row_id: RowId,
    pub table_id: String,
    pub data: RowData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row {
    /// Value of a column, treating JSON null like an absent key.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column).filter(|v| !v.is_null())
    }
}

// ============ FILTERS ============

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Gt,
    In,
    Nin,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    /// Null checks are the only operators that take no comparand.
    pub fn takes_value(&self) -> bool {
        !matches!(self, FilterOp::IsNull | FilterOp::IsNotNull)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Gt => "gt",
            FilterOp::In => "in",
            FilterOp::Nin => "nin",
            FilterOp::IsNull => "isnull",
            FilterOp::IsNotNull => "isnotnull",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: FilterOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    pub fn new(op: FilterOp, value: impl Into<Value>) -> Self {
        Self { op, value: Some(value.into()) }
    }

    pub fn bare(op: FilterOp) -> Self {
        Self { op, value: None }
    }
}

/// Conditions per column; most columns carry one or two.
pub type Conditions = SmallVec<[Condition; 2]>;

pub type Filters = BTreeMap<String, Conditions>;

// ============ PAGE REQUESTS ============

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Keyset pagination token: the last row seen under a given sort.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub last_id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_value: Option<Value>,
    /// Sort column the cursor was derived under. Unstamped cursors are trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_col: Option<String>,
}

fn default_sort_col() -> String {
    ROW_ID_COLUMN.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
    #[serde(default = "default_sort_col")]
    pub sort_col: String,
    #[serde(default)]
    pub sort_dir: SortDir,
    #[serde(default)]
    pub filters: Filters,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            search: None,
            limit: None,
            cursor: None,
            sort_col: default_sort_col(),
            sort_dir: SortDir::Asc,
            filters: Filters::new(),
        }
    }
}

impl PageRequest {
    pub fn sorted_by(mut self, column: &str, dir: SortDir) -> Self {
        self.sort_col = column.to_string();
        self.sort_dir = dir;
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn after(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    pub fn filter(mut self, column: &str, condition: Condition) -> Self {
        self.filters.entry(column.to_string()).or_default().push(condition);
        self
    }
}

// ============ JOBS ============

/// Events published by a bulk-load job. `Done` and `Error` are terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    Progress { rows: u64 },
    Done,
    Error { message: String },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Progress { .. } => "progress",
            JobEvent::Done => "done",
            JobEvent::Error { .. } => "error",
        }
    }
}

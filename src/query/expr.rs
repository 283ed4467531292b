//! Typed query expression tree.
//!
//! Column names are resolved against the table's columns before they get
//! here, and every user-supplied value lives in the parameter list and is
//! referenced by index. Nothing in this module ever holds raw request text.

use serde_json::Value;

use crate::types::{DataType, SortDir, ROW_ID_COLUMN};

/// A column that exists on the target table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRef {
    pub name: String,
    pub data_type: DataType,
}

/// Index into `Predicate::params`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Param(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lte,
    Gte,
}

/// How both sides of a comparison are cast before comparing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareAs {
    Boolean,
    Text,
    Numeric,
    Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortTarget {
    RowId,
    Column(ColumnRef),
}

impl SortTarget {
    pub fn name(&self) -> &str {
        match self {
            SortTarget::RowId => ROW_ID_COLUMN,
            SortTarget::Column(c) => &c.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Compare {
        column: ColumnRef,
        op: CompareOp,
        param: Param,
        as_type: CompareAs,
    },
    /// Case-insensitive substring test on the text rendering.
    Contains {
        column: ColumnRef,
        param: Param,
        negated: bool,
    },
    /// Absent, null or empty string.
    IsNull { column: ColumnRef, negated: bool },
    /// All tokens of the parameter occur in the row's search vector.
    Search { param: Param },
    /// Rows strictly after `(value, id)` in `(sort, rowId)` order.
    /// `value_param` is `None` for row-id sorts and for an absent last value.
    Keyset {
        sort: SortTarget,
        value_param: Option<Param>,
        id_param: Param,
        dir: SortDir,
    },
}

/// Conjunction of clauses plus their bind parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predicate {
    pub clauses: Vec<Expr>,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its reference.
    pub fn bind(&mut self, value: Value) -> Param {
        self.params.push(value);
        Param(self.params.len() - 1)
    }

    pub fn and(&mut self, expr: Expr) {
        self.clauses.push(expr);
    }

    pub fn param(&self, p: Param) -> &Value {
        &self.params[p.0]
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub target: SortTarget,
    pub dir: SortDir,
}

/// A validated page query, ready to count and execute.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub table: String,
    /// Filter and search clauses. Counting uses only these.
    pub predicate: Predicate,
    /// Cursor bound; its params live in `predicate.params`.
    pub keyset: Option<Expr>,
    pub order: OrderBy,
    pub limit: usize,
}

impl CompiledQuery {
    pub fn new(table: &str, predicate: Predicate, order: OrderBy, limit: usize) -> Self {
        Self {
            table: table.to_string(),
            predicate,
            keyset: None,
            order,
            limit,
        }
    }

    /// Filter clauses followed by the keyset bound, if any.
    pub fn select_clauses(&self) -> impl Iterator<Item = &Expr> {
        self.predicate.clauses.iter().chain(self.keyset.iter())
    }

    pub fn search_param(&self) -> Option<&str> {
        self.predicate.clauses.iter().find_map(|c| match c {
            Expr::Search { param } => self.predicate.param(*param).as_str(),
            _ => None,
        })
    }
}

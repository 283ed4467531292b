//! In-process evaluation of compiled queries.
//!
//! `BoundQuery` casts every parameter once up front; per-row evaluation then
//! only casts the stored side. Ordering and keyset comparison share `RowKey`,
//! so a cursor always resumes exactly where the previous page's order ended.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use super::coerce::{self, text_of};
use super::expr::{ColumnRef, CompareAs, CompareOp, CompiledQuery, Expr, Param, SortTarget};
use crate::error::{Error, Result};
use crate::index::SearchVector;
use crate::types::{DataType, Row, RowId, SortDir};

/// Cast sort value. `Absent` orders after every present value.
#[derive(Clone, Debug)]
pub enum SortKey {
    Bool(bool),
    Num(f64),
    Time(DateTime<Utc>),
    Text(String),
    Absent,
}

impl SortKey {
    /// Cast `value` to the column's sort domain; `None` when it cannot be cast.
    pub fn of(value: Option<&Value>, data_type: DataType) -> Option<SortKey> {
        let value = match value {
            None | Some(Value::Null) => return Some(SortKey::Absent),
            Some(v) => v,
        };
        match data_type {
            DataType::Numeric => coerce::parse_number(value).map(SortKey::Num),
            DataType::Date => coerce::timestamp_of(value).map(SortKey::Time),
            DataType::Boolean => coerce::parse_bool(value).map(SortKey::Bool),
            DataType::Text => text_of(value).map(|t| SortKey::Text(t.into_owned())),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Bool(_) => 0,
            SortKey::Num(_) => 1,
            SortKey::Time(_) => 2,
            SortKey::Text(_) => 3,
            SortKey::Absent => 4,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            (SortKey::Num(a), SortKey::Num(b)) => a.total_cmp(b),
            (SortKey::Time(a), SortKey::Time(b)) => a.cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

/// `(sort value, row id)`; row-id sorts carry `Absent` for every row.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowKey {
    pub value: SortKey,
    pub id: RowId,
}

#[derive(Debug)]
enum Operand {
    Unused,
    Bool(bool),
    Text(String),
    Num(f64),
    Time(DateTime<Utc>),
    Tokens(SearchVector),
}

/// A compiled query with its parameters cast for evaluation.
pub struct BoundQuery<'q> {
    query: &'q CompiledQuery,
    operands: Vec<Operand>,
    /// Keyset bound from the cursor.
    after: Option<RowKey>,
}

impl<'q> BoundQuery<'q> {
    pub fn bind(query: &'q CompiledQuery) -> Result<Self> {
        let params = &query.predicate.params;
        let mut operands: Vec<Operand> = params.iter().map(|_| Operand::Unused).collect();
        let mut after = None;

        for expr in query.select_clauses() {
            match expr {
                Expr::Compare { column, param, as_type, .. } => {
                    let raw = &params[param.0];
                    let operand = match as_type {
                        CompareAs::Boolean => coerce::parse_bool(raw).map(Operand::Bool),
                        CompareAs::Text => text_of(raw).map(|t| Operand::Text(t.into_owned())),
                        CompareAs::Numeric => coerce::parse_number(raw).map(Operand::Num),
                        CompareAs::Timestamp => coerce::timestamp_of(raw).map(Operand::Time),
                    };
                    operands[param.0] = operand.ok_or_else(|| {
                        Error::invalid_operand(&column.name, "compare", format!("cannot cast {}", raw))
                    })?;
                }
                Expr::Contains { param, .. } => {
                    let needle = text_of(&params[param.0]).unwrap_or_default().to_lowercase();
                    operands[param.0] = Operand::Text(needle);
                }
                Expr::Search { param } => {
                    let text = params[param.0].as_str().unwrap_or_default();
                    operands[param.0] = Operand::Tokens(SearchVector::from_text(text));
                }
                Expr::Keyset { sort, value_param, id_param, .. } => {
                    after = Some(Self::bind_keyset(query, sort, *value_param, *id_param)?);
                }
                Expr::IsNull { .. } => {}
            }
        }

        Ok(Self { query, operands, after })
    }

    fn bind_keyset(
        query: &CompiledQuery,
        sort: &SortTarget,
        value_param: Option<Param>,
        id_param: Param,
    ) -> Result<RowKey> {
        let id = query.predicate.param(id_param)
            .as_u64()
            .map(RowId)
            .ok_or_else(|| Error::validation("cursor lastId must be an unsigned integer"))?;
        let value = match (sort, value_param) {
            (SortTarget::Column(column), Some(p)) => {
                let raw = query.predicate.param(p);
                SortKey::of(Some(raw), column.data_type).ok_or_else(|| {
                    Error::invalid_operand(&column.name, "cursor", format!("cannot cast {} to {}", raw, column.data_type))
                })?
            }
            _ => SortKey::Absent,
        };
        Ok(RowKey { value, id })
    }

    pub fn query(&self) -> &CompiledQuery {
        self.query
    }

    /// Keyset bound taken from the cursor, if any.
    pub fn after(&self) -> Option<&RowKey> {
        self.after.as_ref()
    }

    pub fn search_tokens(&self) -> Option<&SearchVector> {
        self.operands.iter().find_map(|o| match o {
            Operand::Tokens(v) => Some(v),
            _ => None,
        })
    }

    /// Filter and search clauses only; the count ignores the cursor.
    pub fn matches_filter(&self, row: &Row, vector: &SearchVector) -> Result<bool> {
        for expr in &self.query.predicate.clauses {
            if !self.eval(expr, row, vector)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Filter clauses plus the keyset bound.
    pub fn matches(&self, row: &Row, vector: &SearchVector) -> Result<bool> {
        if !self.matches_filter(row, vector)? {
            return Ok(false);
        }
        match &self.after {
            Some(after) => Ok(self.compare(&self.row_key(row)?, after) == Ordering::Greater),
            None => Ok(true),
        }
    }

    pub fn row_key(&self, row: &Row) -> Result<RowKey> {
        let value = match &self.query.order.target {
            SortTarget::RowId => SortKey::Absent,
            SortTarget::Column(column) => {
                let stored = row.get(&column.name);
                SortKey::of(stored, column.data_type)
                    .ok_or_else(|| mismatch(row, column, column.data_type, stored))?
            }
        };
        Ok(RowKey { value, id: row.row_id })
    }

    /// Order of two keys under the query's direction.
    pub fn compare(&self, a: &RowKey, b: &RowKey) -> Ordering {
        match self.query.order.dir {
            SortDir::Asc => a.cmp(b),
            SortDir::Desc => b.cmp(a),
        }
    }

    fn eval(&self, expr: &Expr, row: &Row, vector: &SearchVector) -> Result<bool> {
        match expr {
            Expr::Compare { column, op, param, as_type } => {
                // Comparisons against an absent value are unknown, hence false.
                let stored = match row.get(&column.name) {
                    Some(v) => v,
                    None => return Ok(false),
                };
                let ord = match (&self.operands[param.0], as_type) {
                    (Operand::Text(t), CompareAs::Text) => {
                        let text = text_of(stored).unwrap_or_default();
                        (*text).cmp(t.as_str())
                    }
                    (Operand::Bool(b), CompareAs::Boolean) => coerce::parse_bool(stored)
                        .ok_or_else(|| mismatch(row, column, DataType::Boolean, Some(stored)))?
                        .cmp(b),
                    (Operand::Num(n), CompareAs::Numeric) => coerce::parse_number(stored)
                        .ok_or_else(|| mismatch(row, column, DataType::Numeric, Some(stored)))?
                        .total_cmp(n),
                    (Operand::Time(t), CompareAs::Timestamp) => coerce::timestamp_of(stored)
                        .ok_or_else(|| mismatch(row, column, DataType::Date, Some(stored)))?
                        .cmp(t),
                    _ => return Err(Error::validation(format!("unbound parameter for '{}'", column.name))),
                };
                Ok(match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::Neq => ord != Ordering::Equal,
                    CompareOp::Lte => ord != Ordering::Greater,
                    CompareOp::Gte => ord != Ordering::Less,
                })
            }
            Expr::Contains { column, param, negated } => {
                let stored = match row.get(&column.name).and_then(text_of) {
                    Some(t) => t.to_lowercase(),
                    None => return Ok(false),
                };
                let found = match &self.operands[param.0] {
                    Operand::Text(needle) => stored.contains(needle.as_str()),
                    _ => false,
                };
                Ok(found != *negated)
            }
            Expr::IsNull { column, negated } => Ok(coerce::is_blank(row.data.get(&column.name)) != *negated),
            Expr::Search { param } => match &self.operands[param.0] {
                Operand::Tokens(tokens) => Ok(vector.contains_all(tokens)),
                _ => Ok(true),
            },
            Expr::Keyset { .. } => match &self.after {
                Some(after) => Ok(self.compare(&self.row_key(row)?, after) == Ordering::Greater),
                None => Ok(true),
            },
        }
    }
}

fn mismatch(row: &Row, column: &ColumnRef, expected: DataType, found: Option<&Value>) -> Error {
    Error::TypeMismatch {
        row_id: Some(row.row_id),
        column: column.name.clone(),
        expected,
        found: found.map(|v| v.to_string()).unwrap_or_else(|| "nothing".into()),
    }
}

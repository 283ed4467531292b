//! Filter predicate compiler
//!
//! Turns `column -> [condition]` plus an optional search string into a
//! `Predicate`. Operator semantics:
//!
//! | op                  | clause                                           |
//! |---------------------|--------------------------------------------------|
//! | `eq` / `neq`        | boolean compare for a boolean comparand, else text equality |
//! | `lt` / `gt`         | inclusive (`<=` / `>=`), numeric or timestamp     |
//! | `in` / `nin`        | case-insensitive substring (negated); `""` skipped |
//! | `isnull` / `isnotnull` | absent, null or `""` (complement)             |
//!
//! A condition without a value (other than the null checks) is dropped.

use serde_json::Value;

use super::coerce::{self, text_of};
use super::expr::{ColumnRef, CompareAs, CompareOp, Expr, Predicate};
use crate::error::{Error, Result};
use crate::index::SearchVector;
use crate::types::{Column, Condition, FilterOp, Filters};

/// Resolve `name` against the table's columns.
pub fn resolve_column(columns: &[Column], name: &str) -> Result<ColumnRef> {
    columns
        .iter()
        .find(|c| c.name == name)
        .map(|c| ColumnRef { name: c.name.clone(), data_type: c.data_type })
        .ok_or_else(|| Error::UnknownColumn(name.to_string()))
}

pub fn compile_filters(filters: &Filters, search: Option<&str>, columns: &[Column]) -> Result<Predicate> {
    let mut predicate = Predicate::new();

    for (name, conditions) in filters {
        let column = resolve_column(columns, name)?;
        for condition in conditions {
            compile_condition(&mut predicate, &column, condition)?;
        }
    }

    if let Some(text) = search.map(str::trim).filter(|s| !s.is_empty()) {
        // Punctuation-only input tokenizes to nothing and matches everything.
        if !SearchVector::from_text(text).is_empty() {
            let param = predicate.bind(Value::String(text.to_string()));
            predicate.and(Expr::Search { param });
        }
    }

    Ok(predicate)
}

fn compile_condition(predicate: &mut Predicate, column: &ColumnRef, condition: &Condition) -> Result<()> {
    let op = condition.op;

    if !op.takes_value() {
        predicate.and(Expr::IsNull {
            column: column.clone(),
            negated: op == FilterOp::IsNotNull,
        });
        return Ok(());
    }

    let value = match condition.value.as_ref() {
        None | Some(Value::Null) => return Ok(()),
        Some(v @ (Value::Array(_) | Value::Object(_))) => {
            return Err(Error::invalid_operand(&column.name, op, format!("expected a scalar, got {}", v)));
        }
        Some(v) => v,
    };

    match op {
        FilterOp::Eq | FilterOp::Neq => {
            let cmp = if op == FilterOp::Eq { CompareOp::Eq } else { CompareOp::Neq };
            let (as_type, bound) = match value {
                Value::Bool(b) => (CompareAs::Boolean, Value::Bool(*b)),
                other => (CompareAs::Text, Value::String(text_of(other).unwrap_or_default().into_owned())),
            };
            let param = predicate.bind(bound);
            predicate.and(Expr::Compare { column: column.clone(), op: cmp, param, as_type });
        }
        FilterOp::Lt | FilterOp::Gt => {
            let cmp = if op == FilterOp::Lt { CompareOp::Lte } else { CompareOp::Gte };
            let (as_type, bound) = range_operand(column, op, value)?;
            let param = predicate.bind(bound);
            predicate.and(Expr::Compare { column: column.clone(), op: cmp, param, as_type });
        }
        FilterOp::In | FilterOp::Nin => {
            let needle = text_of(value).unwrap_or_default();
            if needle.is_empty() {
                return Ok(());
            }
            let param = predicate.bind(Value::String(needle.into_owned()));
            predicate.and(Expr::Contains {
                column: column.clone(),
                param,
                negated: op == FilterOp::Nin,
            });
        }
        // Null checks returned above.
        FilterOp::IsNull | FilterOp::IsNotNull => {}
    }
    Ok(())
}

/// Numbers (or numeric strings) compare numerically; dates as timestamps.
fn range_operand(column: &ColumnRef, op: FilterOp, value: &Value) -> Result<(CompareAs, Value)> {
    if let Some(n) = coerce::parse_number(value) {
        let number = serde_json::Number::from_f64(n)
            .ok_or_else(|| Error::invalid_operand(&column.name, op, "number out of range"))?;
        return Ok((CompareAs::Numeric, Value::Number(number)));
    }
    if let Some(ts) = coerce::timestamp_of(value) {
        return Ok((CompareAs::Timestamp, Value::String(ts.to_rfc3339())));
    }
    Err(Error::invalid_operand(
        &column.name,
        op,
        format!("{} is neither a number nor a date", value),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Condition, DataType};
    use serde_json::json;

    fn columns() -> Vec<Column> {
        vec![
            Column { id: 1, name: "name".into(), data_type: DataType::Text, position: 0 },
            Column { id: 2, name: "age".into(), data_type: DataType::Numeric, position: 1 },
        ]
    }

    fn filters(name: &str, conditions: Vec<Condition>) -> Filters {
        let mut f = Filters::new();
        f.insert(name.to_string(), conditions.into_iter().collect());
        f
    }

    #[test]
    fn test_missing_value_is_dropped() {
        let f = filters("age", vec![Condition::bare(FilterOp::Gt)]);
        let p = compile_filters(&f, None, &columns()).unwrap();
        assert!(p.is_empty());
        assert!(p.params.is_empty());
    }

    #[test]
    fn test_gt_is_inclusive_numeric() {
        let f = filters("age", vec![Condition::new(FilterOp::Gt, 25)]);
        let p = compile_filters(&f, None, &columns()).unwrap();
        assert!(matches!(
            p.clauses[0],
            Expr::Compare { op: CompareOp::Gte, as_type: CompareAs::Numeric, .. }
        ));
        assert_eq!(p.params[0], json!(25.0));
    }

    #[test]
    fn test_date_comparand() {
        let f = filters("name", vec![Condition::new(FilterOp::Lt, "2024-01-31")]);
        let p = compile_filters(&f, None, &columns()).unwrap();
        assert!(matches!(p.clauses[0], Expr::Compare { as_type: CompareAs::Timestamp, .. }));
    }

    #[test]
    fn test_invalid_range_comparand() {
        let f = filters("age", vec![Condition::new(FilterOp::Lt, "soon")]);
        let err = compile_filters(&f, None, &columns()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_unknown_column() {
        let f = filters("salary", vec![Condition::new(FilterOp::Eq, 1)]);
        assert!(matches!(compile_filters(&f, None, &columns()), Err(Error::UnknownColumn(_))));
    }

    #[test]
    fn test_empty_contains_skipped() {
        let f = filters("name", vec![Condition::new(FilterOp::In, ""), Condition::bare(FilterOp::IsNotNull)]);
        let p = compile_filters(&f, None, &columns()).unwrap();
        assert_eq!(p.clauses.len(), 1);
        assert!(matches!(p.clauses[0], Expr::IsNull { negated: true, .. }));
    }

    #[test]
    fn test_blank_search_adds_nothing() {
        let p = compile_filters(&Filters::new(), Some("   "), &columns()).unwrap();
        assert!(p.is_empty());
        let p = compile_filters(&Filters::new(), Some("ada"), &columns()).unwrap();
        assert!(matches!(p.clauses[0], Expr::Search { .. }));
    }

    #[test]
    fn test_eq_boolean_vs_text() {
        let f = filters("name", vec![Condition::new(FilterOp::Eq, true), Condition::new(FilterOp::Neq, 7)]);
        let p = compile_filters(&f, None, &columns()).unwrap();
        assert!(matches!(p.clauses[0], Expr::Compare { as_type: CompareAs::Boolean, .. }));
        assert!(matches!(p.clauses[1], Expr::Compare { as_type: CompareAs::Text, op: CompareOp::Neq, .. }));
        assert_eq!(p.params[1], json!("7"));
    }
}

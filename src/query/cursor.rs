//! Keyset cursor manager
//!
//! Pages are addressed by the last row seen, never by offset:
//! - row-id sort: `rowId > lastId` (`<` descending)
//! - column sort: `(value, rowId) > (lastValue, lastId)` (`<` descending)

use serde_json::Value;

use super::eval::SortKey;
use super::expr::{CompiledQuery, Expr, SortTarget};
use crate::error::{Error, Result};
use crate::types::{Cursor, Row, ROW_ID_COLUMN};

/// Cursor pointing just past `row` under `sort_col`.
pub fn derive_cursor(row: &Row, sort_col: &str) -> Cursor {
    let last_value = if sort_col == ROW_ID_COLUMN {
        None
    } else {
        row.get(sort_col).cloned()
    };
    Cursor {
        last_id: row.row_id,
        last_value,
        sort_col: Some(sort_col.to_string()),
    }
}

/// Bound `query` to rows after `cursor` in the query's order.
///
/// Returns `false` when the cursor was stamped under a different sort column
/// and was discarded; the query then starts from the first row.
pub fn apply_cursor(query: &mut CompiledQuery, cursor: &Cursor) -> Result<bool> {
    let target = query.order.target.clone();

    if let Some(stamp) = cursor.sort_col.as_deref() {
        if stamp != target.name() {
            tracing::debug!(cursor_sort = stamp, sort = target.name(), "discarding cursor from another sort");
            return Ok(false);
        }
    }

    let value_param = match (&target, &cursor.last_value) {
        (SortTarget::RowId, _) | (_, None) | (_, Some(Value::Null)) => None,
        (SortTarget::Column(column), Some(value)) => {
            if SortKey::of(Some(value), column.data_type).is_none() {
                return Err(Error::invalid_operand(
                    &column.name,
                    "cursor",
                    format!("lastValue {} is not a {}", value, column.data_type),
                ));
            }
            Some(query.predicate.bind(value.clone()))
        }
    };
    let id_param = query.predicate.bind(Value::from(cursor.last_id.0));

    query.keyset = Some(Expr::Keyset {
        sort: target,
        value_param,
        id_param,
        dir: query.order.dir,
    });
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{ColumnRef, OrderBy, Predicate};
    use crate::types::{DataType, RowId, SortDir};
    use chrono::Utc;
    use serde_json::json;

    fn row(id: u64, age: Option<i64>) -> Row {
        let mut data = serde_json::Map::new();
        if let Some(a) = age {
            data.insert("age".into(), json!(a));
        }
        Row { row_id: RowId(id), table_id: "people".into(), data, created_at: Utc::now(), updated_at: Utc::now() }
    }

    fn age_query() -> CompiledQuery {
        let target = SortTarget::Column(ColumnRef { name: "age".into(), data_type: DataType::Numeric });
        CompiledQuery::new("people", Predicate::new(), OrderBy { target, dir: SortDir::Asc }, 10)
    }

    #[test]
    fn test_derive_cursor() {
        let c = derive_cursor(&row(4, Some(30)), "age");
        assert_eq!(c.last_id, RowId(4));
        assert_eq!(c.last_value, Some(json!(30)));
        assert_eq!(c.sort_col.as_deref(), Some("age"));

        let c = derive_cursor(&row(4, Some(30)), ROW_ID_COLUMN);
        assert!(c.last_value.is_none());
    }

    #[test]
    fn test_apply_binds_value_and_id() {
        let mut q = age_query();
        let applied = apply_cursor(&mut q, &derive_cursor(&row(4, Some(30)), "age")).unwrap();
        assert!(applied);
        assert_eq!(q.predicate.params, vec![json!(30), json!(4)]);
        assert!(q.predicate.clauses.is_empty());
    }

    #[test]
    fn test_foreign_cursor_discarded() {
        let mut q = age_query();
        let applied = apply_cursor(&mut q, &derive_cursor(&row(4, Some(30)), "name")).unwrap();
        assert!(!applied);
        assert!(q.keyset.is_none());
    }

    #[test]
    fn test_uncastable_last_value() {
        let mut q = age_query();
        let cursor = Cursor { last_id: RowId(1), last_value: Some(json!("old")), sort_col: None };
        assert!(apply_cursor(&mut q, &cursor).unwrap_err().is_validation());
    }
}

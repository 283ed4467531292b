//! Query compilation
//!
//! `compile` turns a `PageRequest` into a `CompiledQuery`: filters and search
//! become a typed predicate (`filter`), the cursor a keyset bound (`cursor`).
//! Stores evaluate it in process (`eval`) or render it to SQL (`sql`).

pub mod coerce;
pub mod cursor;
pub mod eval;
pub mod expr;
pub mod filter;
pub mod sql;

pub use cursor::{apply_cursor, derive_cursor};
pub use eval::{BoundQuery, RowKey, SortKey};
pub use expr::{ColumnRef, CompareAs, CompareOp, CompiledQuery, Expr, OrderBy, Param, Predicate, SortTarget};
pub use filter::{compile_filters, resolve_column};
pub use sql::{render_count, render_select, SqlStatement};

use crate::error::Result;
use crate::types::{Column, PageRequest, ROW_ID_COLUMN};

/// Validate and compile `request` against `columns`. `limit` is already
/// resolved by the caller.
pub fn compile(table: &str, request: &PageRequest, columns: &[Column], limit: usize) -> Result<CompiledQuery> {
    let sort_col = request.sort_col.trim();
    let target = if sort_col.is_empty() || sort_col == ROW_ID_COLUMN {
        SortTarget::RowId
    } else {
        SortTarget::Column(resolve_column(columns, sort_col)?)
    };

    let predicate = compile_filters(&request.filters, request.search.as_deref(), columns)?;
    let order = OrderBy { target, dir: request.sort_dir };
    let mut query = CompiledQuery::new(table, predicate, order, limit);

    if let Some(cursor) = &request.cursor {
        apply_cursor(&mut query, cursor)?;
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{DataType, SortDir};

    #[test]
    fn test_unknown_sort_column() {
        let columns = vec![Column { id: 1, name: "age".into(), data_type: DataType::Numeric, position: 0 }];
        let req = PageRequest::default().sorted_by("salary", SortDir::Desc);
        assert!(matches!(compile("t", &req, &columns, 10), Err(Error::UnknownColumn(_))));

        let req = PageRequest::default().sorted_by("age", SortDir::Desc);
        let q = compile("t", &req, &columns, 10).unwrap();
        assert_eq!(q.order.target.name(), "age");
    }
}

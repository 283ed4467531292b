//! PostgreSQL rendering of compiled queries.
//!
//! Rows live in a single `rows` table (`id bigint`, `table_id text`,
//! `data jsonb`, `search_vector tsvector`, timestamps). Column names only
//! appear as escaped string literals inside `data ->> '...'`; every value is
//! a numbered placeholder. `$1` is always the table id.

use serde_json::Value;
use std::fmt::Write;

use super::expr::{ColumnRef, CompareAs, CompareOp, CompiledQuery, Expr, Param, Predicate, SortTarget};
use crate::types::{DataType, SortDir};

const SELECT_LIST: &str = "id, table_id, data, created_at, updated_at";

/// Statement text plus positional parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: Vec<Value>,
}

struct Renderer<'q> {
    predicate: &'q Predicate,
    params: Vec<Value>,
}

impl<'q> Renderer<'q> {
    fn new(table: &str, predicate: &'q Predicate) -> Self {
        Self { predicate, params: vec![Value::String(table.to_string())] }
    }

    fn placeholder(&mut self, param: Param) -> String {
        self.params.push(self.predicate.param(param).clone());
        format!("${}", self.params.len())
    }

    fn push_value(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn clause(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Compare { column, op, param, as_type } => {
                let p = self.placeholder(*param);
                let sym = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Neq => "<>",
                    CompareOp::Lte => "<=",
                    CompareOp::Gte => ">=",
                };
                match as_type {
                    CompareAs::Text => format!("{} {} {}", text_expr(column), sym, p),
                    CompareAs::Boolean => format!("{}::boolean {} {}::boolean", text_expr(column), sym, p),
                    CompareAs::Numeric => format!("{}::numeric {} {}::numeric", text_expr(column), sym, p),
                    CompareAs::Timestamp => format!("{}::timestamptz {} {}::timestamptz", text_expr(column), sym, p),
                }
            }
            Expr::Contains { column, param, negated } => {
                let p = self.placeholder(*param);
                let cmp = if *negated { "= 0" } else { "> 0" };
                format!("strpos(lower({}), lower({})) {}", text_expr(column), p, cmp)
            }
            Expr::IsNull { column, negated } => {
                let cmp = if *negated { "<>" } else { "=" };
                format!("COALESCE({}, '') {} ''", text_expr(column), cmp)
            }
            Expr::Search { param } => {
                let p = self.placeholder(*param);
                format!("search_vector @@ plainto_tsquery('simple', {})", p)
            }
            Expr::Keyset { sort, value_param, id_param, dir } => self.keyset(sort, *value_param, *id_param, *dir),
        }
    }

    fn keyset(&mut self, sort: &SortTarget, value_param: Option<Param>, id_param: Param, dir: SortDir) -> String {
        let gt = match dir {
            SortDir::Asc => ">",
            SortDir::Desc => "<",
        };
        let column = match sort {
            SortTarget::RowId => {
                let id = self.placeholder(id_param);
                return format!("id {} {}", gt, id);
            }
            SortTarget::Column(c) => c,
        };
        let key = sort_expr(column);
        match (value_param, dir) {
            (Some(v), _) => {
                let value = self.placeholder(v);
                let id = self.placeholder(id_param);
                let value = format!("{}{}", value, cast_suffix(column.data_type));
                let nulls = if dir == SortDir::Asc {
                    format!(" OR {} IS NULL", key)
                } else {
                    String::new()
                };
                format!("({k} {gt} {v} OR ({k} = {v} AND id {gt} {id}){nulls})", k = key, gt = gt, v = value, id = id, nulls = nulls)
            }
            // An absent last value sits at the end ascending and at the start descending.
            (None, SortDir::Asc) => {
                let id = self.placeholder(id_param);
                format!("({} IS NULL AND id {} {})", key, gt, id)
            }
            (None, SortDir::Desc) => {
                let id = self.placeholder(id_param);
                format!("({} IS NOT NULL OR id {} {})", key, gt, id)
            }
        }
    }

    fn where_clause<'a>(&mut self, clauses: impl Iterator<Item = &'a Expr>) -> String {
        let mut text = String::from("WHERE table_id = $1");
        for expr in clauses {
            let rendered = self.clause(expr);
            let _ = write!(text, " AND {}", rendered);
        }
        text
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn text_expr(column: &ColumnRef) -> String {
    format!("(data ->> {})", quote_literal(&column.name))
}

fn cast_suffix(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Text => "",
        DataType::Numeric => "::numeric",
        DataType::Boolean => "::boolean",
        DataType::Date => "::timestamptz",
    }
}

fn sort_expr(column: &ColumnRef) -> String {
    format!("{}{}", text_expr(column), cast_suffix(column.data_type))
}

fn order_clause(query: &CompiledQuery) -> String {
    let dir = query.order.dir.as_sql();
    match &query.order.target {
        SortTarget::RowId => format!("ORDER BY id {}", dir),
        SortTarget::Column(column) => {
            let nulls = match query.order.dir {
                SortDir::Asc => "NULLS LAST",
                SortDir::Desc => "NULLS FIRST",
            };
            format!("ORDER BY {} {} {}, id {}", sort_expr(column), dir, nulls, dir)
        }
    }
}

/// `SELECT count(*)` over the filter; ignores cursor and limit.
pub fn render_count(query: &CompiledQuery) -> SqlStatement {
    let mut r = Renderer::new(&query.table, &query.predicate);
    let where_clause = r.where_clause(query.predicate.clauses.iter());
    SqlStatement {
        text: format!("SELECT count(*) FROM rows {}", where_clause),
        params: r.params,
    }
}

/// One page: filter, keyset bound, order and limit.
pub fn render_select(query: &CompiledQuery) -> SqlStatement {
    let mut r = Renderer::new(&query.table, &query.predicate);
    let where_clause = r.where_clause(query.select_clauses());
    let limit = r.push_value(Value::from(query.limit as u64));
    SqlStatement {
        text: format!("SELECT {} FROM rows {} {} LIMIT {}", SELECT_LIST, where_clause, order_clause(query), limit),
        params: r.params,
    }
}

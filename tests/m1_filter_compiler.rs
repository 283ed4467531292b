//! Tests for M1: Filter Predicate Compiler
//! Covers TC-1.1 through TC-1.8 against the embedded store.
//!
//! Run with:
//! cargo test --test m1_filter_compiler -- --nocapture

use serde_json::{json, Value};
use sheetgrid::query::compile;
use sheetgrid::store::{RowCursor, RowStore};
use sheetgrid::{ColumnSpec, Condition, DataType, Error, FilterOp, MemoryRowStore, PageRequest, Row, RowData};

fn data(v: Value) -> RowData {
    v.as_object().cloned().unwrap()
}

/// people(name text, age numeric, email text, active boolean, joined date)
fn setup_store() -> MemoryRowStore {
    let store = MemoryRowStore::in_memory();
    store
        .create_table(
            "people",
            vec![
                ColumnSpec::new("name", DataType::Text),
                ColumnSpec::new("age", DataType::Numeric),
                ColumnSpec::new("email", DataType::Text),
                ColumnSpec::new("active", DataType::Boolean),
                ColumnSpec::new("joined", DataType::Date),
            ],
        )
        .unwrap();
    let rows = [
        json!({"name": "Ada Lovelace", "age": 20, "email": "ada@example.com", "active": true, "joined": "2023-05-01"}),
        json!({"name": "Alan Turing", "age": 25, "email": "", "active": false, "joined": "2024-01-01"}),
        json!({"name": "Grace Hopper", "age": 30, "active": true, "joined": "2024-06-15"}),
        json!({"name": "Edsger Dijkstra", "email": null, "joined": "2022-11-30"}),
    ];
    for row in rows {
        store.insert_row("people", data(row)).unwrap();
    }
    store
}

fn select(store: &MemoryRowStore, req: &PageRequest) -> Result<(u64, Vec<Row>), Error> {
    let columns = store.columns("people")?;
    let query = compile("people", req, &columns, 1000)?;
    let total = store.count(&query)?;
    let rows = store.open_cursor(&query)?.fetch(1000)?;
    Ok((total, rows))
}

fn names(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.data["name"].as_str().unwrap().to_string()).collect()
}

fn filter(column: &str, op: FilterOp, value: Value) -> PageRequest {
    PageRequest::default().filter(column, Condition::new(op, value))
}

mod tc_1_1_missing_value_is_dropped {
    use super::*;

    #[test]
    fn test_condition_without_value_is_a_no_op() {
        let store = setup_store();
        let req = PageRequest::default()
            .filter("age", Condition::bare(FilterOp::Eq))
            .filter("name", Condition { op: FilterOp::Gt, value: Some(Value::Null) });
        let (total, rows) = select(&store, &req).unwrap();
        assert_eq!(total, 4);
        assert_eq!(rows.len(), 4);
    }
}

mod tc_1_2_range_bounds_are_inclusive {
    use super::*;

    #[test]
    fn test_gt_25_includes_25() {
        let store = setup_store();
        let (total, rows) = select(&store, &filter("age", FilterOp::Gt, json!(25))).unwrap();
        assert_eq!(total, 2);
        assert_eq!(names(&rows), vec!["Alan Turing", "Grace Hopper"]);
    }

    #[test]
    fn test_lt_accepts_numeric_strings() {
        let store = setup_store();
        let (total, rows) = select(&store, &filter("age", FilterOp::Lt, json!("25"))).unwrap();
        assert_eq!(total, 2);
        assert_eq!(names(&rows), vec!["Ada Lovelace", "Alan Turing"]);
    }

    #[test]
    fn test_date_comparand_compares_as_timestamp() {
        let store = setup_store();
        let (_, rows) = select(&store, &filter("joined", FilterOp::Gt, json!("2024-01-01"))).unwrap();
        assert_eq!(names(&rows), vec!["Alan Turing", "Grace Hopper"]);
    }

    #[test]
    fn test_non_numeric_non_date_comparand_is_rejected() {
        let store = setup_store();
        let err = select(&store, &filter("age", FilterOp::Gt, json!("abc"))).unwrap_err();
        assert!(matches!(err, Error::InvalidOperand { .. }), "got {:?}", err);
        assert!(err.is_validation());
    }
}

mod tc_1_3_null_checks {
    use super::*;

    #[test]
    fn test_isnull_matches_absent_null_and_empty() {
        let store = setup_store();
        let req = PageRequest::default().filter("email", Condition::bare(FilterOp::IsNull));
        let (total, rows) = select(&store, &req).unwrap();
        assert_eq!(total, 3);
        assert_eq!(names(&rows), vec!["Alan Turing", "Grace Hopper", "Edsger Dijkstra"]);
    }

    #[test]
    fn test_isnotnull_is_exact_complement() {
        let store = setup_store();
        let req = PageRequest::default().filter("email", Condition::bare(FilterOp::IsNotNull));
        let (total, rows) = select(&store, &req).unwrap();
        assert_eq!(total, 1);
        assert_eq!(names(&rows), vec!["Ada Lovelace"]);
    }

    #[test]
    fn test_comparisons_skip_absent_values() {
        let store = setup_store();
        // Dijkstra has no age: neither side of the comparison admits him.
        let (above, _) = select(&store, &filter("age", FilterOp::Gt, json!(0))).unwrap();
        let (neq, _) = select(&store, &filter("age", FilterOp::Neq, json!(20))).unwrap();
        assert_eq!(above, 3);
        assert_eq!(neq, 2);
    }
}

mod tc_1_4_containment {
    use super::*;

    #[test]
    fn test_in_is_case_insensitive_substring() {
        let store = setup_store();
        let (_, rows) = select(&store, &filter("name", FilterOp::In, json!("HOP"))).unwrap();
        assert_eq!(names(&rows), vec!["Grace Hopper"]);
    }

    #[test]
    fn test_nin_excludes_matches() {
        let store = setup_store();
        let (total, _) = select(&store, &filter("name", FilterOp::Nin, json!("a"))).unwrap();
        // Every name contains an "a"
        assert_eq!(total, 0);
    }

    #[test]
    fn test_empty_needle_is_skipped() {
        let store = setup_store();
        let (total, _) = select(&store, &filter("name", FilterOp::In, json!(""))).unwrap();
        assert_eq!(total, 4);
    }
}

mod tc_1_5_equality {
    use super::*;

    #[test]
    fn test_boolean_comparand_compares_as_boolean() {
        let store = setup_store();
        let (_, rows) = select(&store, &filter("active", FilterOp::Eq, json!(true))).unwrap();
        assert_eq!(names(&rows), vec!["Ada Lovelace", "Grace Hopper"]);
    }

    #[test]
    fn test_text_equality_uses_text_rendering() {
        let store = setup_store();
        let (_, rows) = select(&store, &filter("age", FilterOp::Eq, json!("30"))).unwrap();
        assert_eq!(names(&rows), vec!["Grace Hopper"]);
    }

    #[test]
    fn test_conditions_on_a_column_are_conjunctive() {
        let store = setup_store();
        let req = PageRequest::default()
            .filter("age", Condition::new(FilterOp::Gt, 21))
            .filter("age", Condition::new(FilterOp::Lt, 29));
        let (_, rows) = select(&store, &req).unwrap();
        assert_eq!(names(&rows), vec!["Alan Turing"]);
    }
}

mod tc_1_6_search {
    use super::*;

    #[test]
    fn test_all_tokens_must_match() {
        let store = setup_store();
        let (_, rows) = select(&store, &PageRequest::default().search("grace HOPPER")).unwrap();
        assert_eq!(names(&rows), vec!["Grace Hopper"]);
        let (total, _) = select(&store, &PageRequest::default().search("grace turing")).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let store = setup_store();
        let (total, _) = select(&store, &PageRequest::default().search("   ")).unwrap();
        assert_eq!(total, 4);
    }
}

mod tc_1_7_rejections {
    use super::*;

    #[test]
    fn test_unknown_filter_column() {
        let store = setup_store();
        let err = select(&store, &filter("salary", FilterOp::Eq, json!(1))).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(ref c) if c == "salary"));
    }

    #[test]
    fn test_structured_comparand() {
        let store = setup_store();
        for value in [json!([1, 2]), json!({"a": 1})] {
            let err = select(&store, &filter("age", FilterOp::Eq, value)).unwrap_err();
            assert!(matches!(err, Error::InvalidOperand { .. }));
        }
    }

    #[test]
    fn test_hostile_column_name_never_compiles() {
        let store = setup_store();
        let err = select(&store, &filter("name'); DROP TABLE rows; --", FilterOp::Eq, json!("x"))).unwrap_err();
        assert!(err.is_validation());
    }
}

mod tc_1_8_wire_shape {
    use super::*;

    #[test]
    fn test_filters_deserialize_from_request_json() {
        let store = setup_store();
        let req: PageRequest = serde_json::from_value(json!({
            "filters": {
                "age": [{"op": "gt", "value": 21}, {"op": "lt"}],
                "email": [{"op": "isnull"}]
            },
            "sortCol": "age",
            "sortDir": "desc"
        }))
        .unwrap();
        let (total, rows) = select(&store, &req).unwrap();
        assert_eq!(total, 2);
        assert_eq!(names(&rows), vec!["Grace Hopper", "Alan Turing"]);
    }
}

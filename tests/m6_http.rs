//! Tests for M6: HTTP Surface
//! Covers TC-6.1 through TC-6.5: table setup, NDJSON streaming, error
//! statuses, bulk-load jobs with their SSE feed and the health endpoint.
//!
//! Run with:
//! cargo test --test m6_http -- --nocapture

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

use sheetgrid::config::ServiceConfig;
use sheetgrid::stream::{LineDecoder, StreamRecord};
use sheetgrid::{build_router, AppState, MemoryRowStore};

fn app() -> Router {
    build_router(AppState::new(MemoryRowStore::in_memory(), ServiceConfig::default()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = tokio::time::timeout(Duration::from_secs(10), response.into_body().collect())
        .await
        .expect("response body timeout")
        .unwrap()
        .to_bytes();
    (status, bytes.to_vec(), content_type)
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes, _) = send(app, method, uri, body).await;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

/// `contacts(name text, age numeric)` with `n` rows.
async fn seeded(n: usize) -> Router {
    let app = app();
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/tables",
        Some(json!({
            "name": "contacts",
            "columns": [{"name": "name", "dataType": "text"}, {"name": "age", "dataType": "numeric"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    for i in 0..n {
        let (status, _) = send_json(
            &app,
            Method::POST,
            "/api/tables/contacts/rows",
            Some(json!({"data": {"name": format!("contact {}", i), "age": 20 + i}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    app
}

fn records(body: &[u8]) -> Vec<StreamRecord> {
    let mut decoder = LineDecoder::new();
    let mut out: Vec<StreamRecord> = decoder.push(body).into_iter().map(|r| r.unwrap()).collect();
    out.extend(decoder.finish().map(|r| r.unwrap()));
    out
}

mod tc_6_1_tables {
    use super::*;

    #[tokio::test]
    async fn test_create_insert_and_list_columns() {
        let app = seeded(2).await;
        let (status, columns) = send_json(&app, Method::GET, "/api/tables/contacts/columns", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = columns.as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["name", "age"]);
        assert_eq!(columns[1]["dataType"], "numeric");
    }

    #[tokio::test]
    async fn test_column_lifecycle() {
        let app = seeded(1).await;
        let (status, column) = send_json(
            &app,
            Method::POST,
            "/api/tables/contacts/columns",
            Some(json!({"name": "vip", "dataType": "boolean"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(column["name"], "vip");

        let (status, body) = send_json(
            &app,
            Method::POST,
            "/api/tables/contacts/columns",
            Some(json!({"name": "vip", "dataType": "text"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("vip"));

        let (status, _) = send_json(&app, Method::DELETE, "/api/tables/contacts/columns/vip", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, columns) = send_json(&app, Method::GET, "/api/tables/contacts/columns", None).await;
        assert_eq!(columns.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_type_mismatch_is_unprocessable() {
        let app = seeded(0).await;
        let (status, body) = send_json(&app, Method::POST, "/api/tables/contacts/rows", Some(json!({"data": {"age": "old"}}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());
    }
}

mod tc_6_2_streaming {
    use super::*;

    #[tokio::test]
    async fn test_stream_is_ndjson_with_count_first() {
        let app = seeded(5).await;
        let (status, body, content_type) = send(
            &app,
            Method::POST,
            "/api/tables/contacts/rows/stream",
            Some(json!({"sortCol": "age", "sortDir": "desc", "limit": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/x-ndjson"));

        let records = records(&body);
        assert_eq!(records[0], StreamRecord::Header { total_rows: 5 });
        let ages: Vec<i64> = records[1..]
            .iter()
            .map(|r| match r {
                StreamRecord::Row(row) => row.data["age"].as_i64().unwrap(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(ages, vec![24, 23, 22]);
    }

    #[tokio::test]
    async fn test_filters_and_search_over_http() {
        let app = seeded(5).await;
        let (_, body, _) = send(
            &app,
            Method::POST,
            "/api/tables/contacts/rows/stream",
            Some(json!({"search": "contact", "filters": {"age": [{"op": "gt", "value": 23}]}})),
        )
        .await;
        let records = records(&body);
        assert_eq!(records[0], StreamRecord::Header { total_rows: 2 });
        assert_eq!(records.len(), 3);
    }
}

mod tc_6_3_error_statuses {
    use super::*;

    #[tokio::test]
    async fn test_invalid_limit_is_bad_request() {
        let app = seeded(1).await;
        let (status, body) = send_json(&app, Method::POST, "/api/tables/contacts/rows/stream", Some(json!({"limit": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let app = seeded(0).await;
        let (status, body) = send_json(&app, Method::POST, "/api/tables/ghost/rows/stream", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = seeded(0).await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/tables/contacts/rows/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"limit\": "))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_filter_column_is_bad_request() {
        let app = seeded(1).await;
        let (status, _) = send_json(
            &app,
            Method::POST,
            "/api/tables/contacts/rows/stream",
            Some(json!({"filters": {"salary": [{"op": "eq", "value": 1}]}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_table_conflicts() {
        let app = seeded(0).await;
        let (status, _) = send_json(&app, Method::POST, "/api/tables", Some(json!({"name": "contacts"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}

mod tc_6_4_bulk_load {
    use super::*;

    #[tokio::test]
    async fn test_accepted_job_reports_done_over_sse() {
        let app = seeded(1).await;
        let (status, accepted) = send_json(
            &app,
            Method::POST,
            "/api/tables/contacts/bulk-load",
            Some(json!({"rows": 500, "batchSize": 100})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let job_id = accepted["jobId"].as_str().unwrap().to_string();

        let (status, body, content_type) = send(&app, Method::GET, &format!("/api/jobs/{}/events", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/event-stream"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("event: done"), "{}", text);
        assert!(text.contains(r#"data: {"type":"done"}"#));

        let (_, body, _) = send(&app, Method::POST, "/api/tables/contacts/rows/stream", Some(json!({"limit": 1}))).await;
        assert_eq!(records(&body)[0], StreamRecord::Header { total_rows: 501 });
    }

    #[tokio::test]
    async fn test_bulk_load_rejections() {
        let app = seeded(0).await;
        let (status, _) = send_json(&app, Method::POST, "/api/tables/ghost/bulk-load", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send_json(&app, Method::POST, "/api/tables/contacts/bulk-load", Some(json!({"rows": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_job_id() {
        let app = seeded(0).await;
        let unknown = uuid::Uuid::new_v4();
        let (status, _) = send_json(&app, Method::GET, &format!("/api/jobs/{}/events", unknown), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send_json(&app, Method::GET, "/api/jobs/not-a-uuid/events", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod tc_6_5_health {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_pool_and_tables() {
        let app = seeded(0).await;
        let (status, body) = send_json(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tables"], 1);
        assert_eq!(body["connections"]["size"], 16);
        assert_eq!(body["connections"]["inUse"], 0);
        assert_eq!(body["runningJobs"], 0);
    }

    #[tokio::test]
    async fn test_data_version_advances_on_writes() {
        let app = seeded(2).await;
        let (_, before) = send_json(&app, Method::GET, "/health", None).await;
        let before = before["dataVersion"].as_u64().unwrap();
        assert!(before >= 2);

        let (status, _) = send_json(&app, Method::POST, "/api/tables/contacts/rows", Some(json!({"data": {"name": "x"}}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, after) = send_json(&app, Method::GET, "/health", None).await;
        assert_eq!(after["dataVersion"].as_u64().unwrap(), before + 1);

        let (status, _) = send_json(&app, Method::GET, "/api/tables/contacts/columns", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, unchanged) = send_json(&app, Method::GET, "/health", None).await;
        assert_eq!(unchanged["dataVersion"], after["dataVersion"]);
    }
}

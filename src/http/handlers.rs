//! Request handlers.

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;

use super::state::AppState;
use crate::error::{Error, Result};
use crate::jobs::{spawn_bulk_load, BulkLoadRequest, BulkLoadSpec, JobId, JobSubscription, SyntheticRows};
use crate::store::blocking;
use crate::stream::CONTENT_TYPE;
use crate::types::{Column, ColumnSpec, JobEvent, PageRequest, Row, RowData};

// ============ STREAMING ============

/// `POST /api/tables/{table}/rows/stream`
pub async fn stream_rows(
    State(state): State<AppState>,
    Path(table): Path<String>,
    payload: std::result::Result<Json<PageRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;
    // Validation, unknown tables and pool exhaustion all surface here as
    // plain JSON errors; once streaming starts failures become error lines.
    let rows = state.executor().stream(&table, &request).await?;
    let body = Body::from_stream(rows.map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

// ============ JOBS ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: JobId,
}

/// `POST /api/tables/{table}/bulk-load`. The body is optional.
pub async fn bulk_load(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<JobAccepted>)> {
    let request: BulkLoadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BulkLoadRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| Error::validation(format!("bulk-load body: {}", e)))?
    };
    let spec = BulkLoadSpec::resolve(&request, &state.config().jobs)?;
    let job_id = spawn_bulk_load(
        state.jobs(),
        state.row_store(),
        &table,
        spec,
        Box::new(SyntheticRows::new()),
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// `GET /api/jobs/{job_id}/events`. The stream ends after the terminal event.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let id = JobId::parse(&job_id)?;
    let subscription = state.jobs().subscribe(id)?;
    tracing::debug!(job = %id, "job subscriber attached");
    Ok(Sse::new(job_event_stream(subscription)).keep_alive(KeepAlive::default()))
}

fn job_event_stream(subscription: JobSubscription) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    stream::unfold(Some(subscription), |subscription| async move {
        let mut subscription = subscription?;
        let event = subscription.next().await?;
        let next = if event.is_terminal() { None } else { Some(subscription) };
        Some((Ok(sse_event(&event)), next))
    })
}

fn sse_event(event: &JobEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| format!(r#"{{"type":"{}"}}"#, event.kind()));
    Event::default().event(event.kind()).data(data)
}

// ============ TABLES & COLUMNS ============

#[derive(Deserialize)]
pub struct CreateTable {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Serialize)]
pub struct TableCreated {
    pub name: String,
    pub columns: Vec<Column>,
}

/// `POST /api/tables`
pub async fn create_table(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateTable>, JsonRejection>,
) -> Result<(StatusCode, Json<TableCreated>)> {
    let Json(CreateTable { name, columns }) = payload?;
    let store = state.store().clone();
    let table = name.clone();
    let columns = blocking(move || store.create_table(&table, columns)).await?;
    Ok((StatusCode::CREATED, Json(TableCreated { name, columns })))
}

/// `GET /api/tables/{table}/columns`
pub async fn list_columns(State(state): State<AppState>, Path(table): Path<String>) -> Result<Json<Vec<Column>>> {
    let store = state.row_store();
    Ok(Json(blocking(move || store.columns(&table)).await?))
}

/// `POST /api/tables/{table}/columns`
pub async fn add_column(
    State(state): State<AppState>,
    Path(table): Path<String>,
    payload: std::result::Result<Json<ColumnSpec>, JsonRejection>,
) -> Result<(StatusCode, Json<Column>)> {
    let Json(spec) = payload?;
    let store = state.store().clone();
    let column = blocking(move || store.add_column(&table, spec)).await?;
    Ok((StatusCode::CREATED, Json(column)))
}

/// `DELETE /api/tables/{table}/columns/{name}`
pub async fn drop_column(
    State(state): State<AppState>,
    Path((table, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    let store = state.store().clone();
    blocking(move || store.drop_column(&table, &name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ ROWS ============

#[derive(Deserialize)]
pub struct InsertRow {
    #[serde(default)]
    pub data: RowData,
}

/// `POST /api/tables/{table}/rows`
pub async fn insert_row(
    State(state): State<AppState>,
    Path(table): Path<String>,
    payload: std::result::Result<Json<InsertRow>, JsonRejection>,
) -> Result<(StatusCode, Json<Row>)> {
    let Json(InsertRow { data }) = payload?;
    let store = state.store().clone();
    let row = blocking(move || store.insert_row(&table, data)).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

// ============ HEALTH ============

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let pool = state.executor().pool();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tables": state.store().tables().len(),
        "dataVersion": state.store().version(),
        "connections": { "size": pool.size(), "inUse": pool.in_use() },
        "runningJobs": state.jobs().running(),
    }))
}

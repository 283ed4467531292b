//! HTTP surface
//!
//! ```text
//! /health                                 GET     liveness and pool usage
//! /api/tables                             POST    create a table
//! /api/tables/{table}/columns             GET     list columns
//!                                         POST    add a column
//! /api/tables/{table}/columns/{name}      DELETE  drop a column
//! /api/tables/{table}/rows                POST    insert a row
//! /api/tables/{table}/rows/stream         POST    NDJSON page stream
//! /api/tables/{table}/bulk-load           POST    start a bulk load (202)
//! /api/jobs/{job_id}/events               GET     SSE job progress
//! ```

mod error;
pub mod handlers;
mod state;

pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::Router;

use handlers::*;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/tables", post(create_table))
        .route("/tables/{table}/columns", get(list_columns).post(add_column))
        .route("/tables/{table}/columns/{name}", delete(drop_column))
        .route("/tables/{table}/rows", post(insert_row))
        .route("/tables/{table}/rows/stream", post(stream_rows))
        .route("/tables/{table}/bulk-load", post(bulk_load))
        .route("/jobs/{job_id}/events", get(job_events))
}

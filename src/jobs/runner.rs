//! Bulk-load job runner
//!
//! A load opens one bulk transaction (async commit, search index suspended),
//! stages generated batches into it and commits once at the end, so readers
//! see either none or all of the rows. Progress is published at most once
//! per interval; the task yields between batches so streaming requests keep
//! being served. A generator that returns a short batch fails the job.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::generator::BatchGenerator;
use super::registry::{JobId, JobPublisher, JobRegistry};
use crate::config::JobsConfig;
use crate::error::{Error, Result};
use crate::store::{blocking, BulkOptions, BulkTxn, RowStore};

/// Staged rows live in memory until commit.
pub const MAX_BULK_ROWS: u64 = 5_000_000;

/// Body of a bulk-load request. Missing fields fall back to configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkLoadRequest {
    #[serde(default)]
    pub rows: Option<u64>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Resolved parameters of one load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkLoadSpec {
    pub rows: u64,
    pub batch_size: usize,
    pub progress_interval: Duration,
}

impl BulkLoadSpec {
    pub fn resolve(request: &BulkLoadRequest, config: &JobsConfig) -> Result<Self> {
        let rows = request.rows.unwrap_or(config.bulk_rows);
        let batch_size = request.batch_size.unwrap_or(config.bulk_batch_size);
        if rows == 0 || rows > MAX_BULK_ROWS {
            return Err(Error::validation(format!("rows must be between 1 and {}, got {}", MAX_BULK_ROWS, rows)));
        }
        if batch_size == 0 {
            return Err(Error::validation("batchSize must be positive"));
        }
        Ok(Self { rows, batch_size, progress_interval: config.progress_interval() })
    }
}

/// Run a load to completion on the current task. Returns rows committed.
/// Any error leaves the table untouched.
pub async fn run_bulk_load(
    store: Arc<dyn RowStore>,
    table: &str,
    spec: BulkLoadSpec,
    mut generator: Box<dyn BatchGenerator>,
    publisher: &JobPublisher,
) -> Result<u64> {
    let name = table.to_string();
    let mut txn: Box<dyn BulkTxn> = blocking(move || store.begin_bulk(&name, BulkOptions::default())).await?;

    let mut written = 0u64;
    let mut last_report = Instant::now();
    while written < spec.rows {
        let n = spec.batch_size.min((spec.rows - written) as usize);
        let (returned_txn, returned_gen, staged) = blocking(move || {
            let staged = generator.generate(txn.columns(), n).and_then(|rows| {
                if rows.len() != n {
                    return Err(Error::JobFailed(format!(
                        "generator returned {} rows for a batch of {}",
                        rows.len(),
                        n
                    )));
                }
                txn.append(rows)
            });
            Ok((txn, generator, staged))
        })
        .await?;
        txn = returned_txn;
        generator = returned_gen;
        written = staged?;

        if last_report.elapsed() >= spec.progress_interval {
            publisher.progress(written);
            last_report = Instant::now();
        }
        tokio::task::yield_now().await;
    }

    blocking(move || txn.commit()).await
}

/// Register a job, start the load on a background task and return its id.
/// Fails before anything is spawned if the table does not exist.
pub async fn spawn_bulk_load(
    registry: &JobRegistry,
    store: Arc<dyn RowStore>,
    table: &str,
    spec: BulkLoadSpec,
    generator: Box<dyn BatchGenerator>,
) -> Result<JobId> {
    let lookup = Arc::clone(&store);
    let name = table.to_string();
    blocking(move || lookup.columns(&name)).await?;

    let (id, publisher) = registry.create_job()?;
    let table = table.to_string();
    let handle = tokio::spawn(async move {
        let started = Instant::now();
        tracing::info!(job = %id, %table, rows = spec.rows, batch_size = spec.batch_size, "bulk load started");
        match run_bulk_load(store, &table, spec, generator, &publisher).await {
            Ok(committed) => {
                tracing::info!(
                    job = %id,
                    %table,
                    committed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "bulk load committed"
                );
                publisher.done();
            }
            Err(e) => {
                tracing::warn!(job = %id, %table, error = %e, "bulk load failed, rolled back");
                publisher.fail(e.to_string());
            }
        }
    });
    registry.attach(id, handle);
    Ok(id)
}

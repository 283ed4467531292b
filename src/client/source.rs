//! Where a consumer's pages come from.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};

use crate::error::Result;
use crate::stream::StreamExecutor;
use crate::types::PageRequest;

/// Raw NDJSON bytes of one page, in arbitrary chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn open(&self, table: &str, request: &PageRequest) -> Result<ByteStream>;
}

/// In-process source backed by an executor.
pub struct LocalSource {
    executor: StreamExecutor,
}

impl LocalSource {
    pub fn new(executor: StreamExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PageSource for LocalSource {
    async fn open(&self, table: &str, request: &PageRequest) -> Result<ByteStream> {
        let rows = self.executor.stream(table, request).await?;
        Ok(rows.map(Ok).boxed())
    }
}

#[cfg(feature = "http-client")]
pub use remote::HttpSource;

#[cfg(feature = "http-client")]
mod remote {
    use super::*;
    use crate::client::sse::SseDecoder;
    use crate::error::Error;
    use crate::jobs::{BulkLoadRequest, JobId};
    use crate::types::{Column, JobEvent};
    use reqwest::Url;

    /// Source that POSTs to `/api/tables/{table}/rows/stream`.
    #[derive(Clone)]
    pub struct HttpSource {
        client: reqwest::Client,
        base_url: Url,
    }

    impl HttpSource {
        pub fn new(base_url: &str) -> Result<Self> {
            Self::with_client(reqwest::Client::new(), base_url)
        }

        pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
            let base_url = Url::parse(base_url).map_err(|e| Error::validation(format!("base url: {}", e)))?;
            Ok(Self { client, base_url })
        }

        pub(crate) fn url(&self, segments: &[&str]) -> Result<Url> {
            let mut url = self.base_url.clone();
            url.path_segments_mut()
                .map_err(|_| Error::validation("base url cannot carry a path"))?
                .pop_if_empty()
                .extend(segments);
            Ok(url)
        }
    }

    /// Turn a non-success response into `Error::Rejected`.
    pub(crate) async fn reject(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("error")
                .and_then(|e| e.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => format!("HTTP {}", status),
        };
        Error::Rejected { status, message }
    }

    impl HttpSource {
        pub async fn columns(&self, table: &str) -> Result<Vec<Column>> {
            let url = self.url(&["api", "tables", table, "columns"])?;
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(reject(response).await);
            }
            Ok(response.json().await?)
        }

        /// Start a bulk load; returns the job id from the 202 response.
        pub async fn start_bulk_load(&self, table: &str, request: &BulkLoadRequest) -> Result<JobId> {
            let url = self.url(&["api", "tables", table, "bulk-load"])?;
            let response = self.client.post(url).json(request).send().await?;
            if !response.status().is_success() {
                return Err(reject(response).await);
            }
            let accepted: serde_json::Value = response.json().await?;
            accepted
                .get("jobId")
                .and_then(|id| id.as_str())
                .ok_or_else(|| Error::validation("bulk-load response carries no jobId"))
                .and_then(JobId::parse)
        }

        /// Events of a job until (and including) its terminal event.
        pub async fn job_events(&self, job: JobId) -> Result<BoxStream<'static, Result<JobEvent>>> {
            let url = self.url(&["api", "jobs", &job.to_string(), "events"])?;
            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(reject(response).await);
            }
            let mut decoder = SseDecoder::new();
            let events = response
                .bytes_stream()
                .map(move |chunk| match chunk {
                    Ok(bytes) => futures::stream::iter(decoder.push(&bytes)),
                    Err(e) => futures::stream::iter(vec![Err(Error::from(e))]),
                })
                .flatten();
            Ok(events.boxed())
        }
    }

    #[async_trait]
    impl PageSource for HttpSource {
        async fn open(&self, table: &str, request: &PageRequest) -> Result<ByteStream> {
            let url = self.url(&["api", "tables", table, "rows", "stream"])?;
            let response = self.client.post(url).json(request).send().await?;
            if !response.status().is_success() {
                return Err(reject(response).await);
            }
            Ok(response.bytes_stream().map(|chunk| chunk.map_err(Error::from)).boxed())
        }
    }

}

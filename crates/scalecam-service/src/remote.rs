//! HTTP client for an edge provider.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use scalecam_service::catchup::MeasurementSource;
//! use scalecam_service::remote::RemoteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = RemoteStore::new("http://cats.local:8000", Duration::from_secs(30))?;
//! let rows = remote.fetch_rows(None, Some(100)).await?;
//! println!("{} rows", rows.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode, header};
use tracing::debug;

use scalecam_types::{ClipName, MeasurementRow, Timestamp};

use crate::api::HealthResponse;
use crate::catchup::{ClipDownload, ClipSource, MeasurementSource};
use crate::error::{Error, Result};

/// A provider reachable over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl RemoteStore {
    /// Create a client for the provider at `base_url`.
    ///
    /// `timeout` bounds connecting and each JSON request. Clip bodies are
    /// streamed without a total limit; the scheduler's tick timeout covers
    /// them.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::unavailable(base_url, e))?;
        Self::with_client(base_url, client, timeout)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::unavailable(
                base_url,
                "URL must start with http:// or https://",
            ));
        }

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get provider health.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/api/health", self.base_url);
        let response = self.send(self.client.get(&url).timeout(self.timeout), &url).await?;
        let body = response.bytes().await.map_err(|e| Error::unavailable(&url, e))?;
        serde_json::from_slice(&body).map_err(|e| Error::malformed(&url, e))
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| Error::unavailable(url, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| status.to_string());
        Err(Error::unavailable(url, message))
    }
}

#[async_trait]
impl MeasurementSource for RemoteStore {
    async fn fetch_rows(
        &self,
        after: Option<Timestamp>,
        limit: Option<u32>,
    ) -> Result<Vec<MeasurementRow>> {
        let url = format!("{}/", self.base_url);
        let mut params = Vec::new();
        if let Some(ts) = after {
            params.push(("from_ts", ts.as_micros().to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let request = self.client.get(&url).query(&params).timeout(self.timeout);
        let response = self.send(request, &url).await?;
        let body = response.bytes().await.map_err(|e| Error::unavailable(&url, e))?;
        let rows: Vec<MeasurementRow> =
            serde_json::from_slice(&body).map_err(|e| Error::malformed(&url, e))?;

        debug!("Received {} rows from {}", rows.len(), url);
        Ok(rows)
    }
}

#[async_trait]
impl ClipSource for RemoteStore {
    async fn next_clip(&self, after: Option<&ClipName>) -> Result<Option<ClipDownload>> {
        let url = format!("{}/clips", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(name) = after {
            request = request.query(&[("from", name.as_str())]);
        }

        let response = self.send(request, &url).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::malformed(&url, "file without Content-Disposition"))?;
        let filename = filename_from_disposition(disposition)
            .ok_or_else(|| Error::malformed(&url, format!("no filename in {:?}", disposition)))?;
        let name = ClipName::parse(filename).map_err(|e| Error::malformed(&url, e))?;

        let stream_url = url.clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| Error::unavailable(&stream_url, e)))
            .boxed();

        Ok(Some(ClipDownload { name, body }))
    }
}

/// The `filename` parameter of a `Content-Disposition` value.
pub(crate) fn filename_from_disposition(value: &str) -> Option<&str> {
    value.split(';').find_map(|part| {
        let (key, val) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| val.trim().trim_matches('"'))
            .filter(|name| !name.is_empty())
    })
}

use crate::error::{Error, Result};
use crate::metrics;
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Response returned by a single upstream call
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    /// JSON body, or the raw text as a JSON string when the body is not JSON
    pub payload: Value,
}

impl UpstreamResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// A single upstream endpoint that can be called once per invocation
#[async_trait]
pub trait Upstream: Send + Sync {
    /// URL of the endpoint, used in responses and logs
    fn url(&self) -> &str;

    /// Perform one call and return whatever status the upstream answered with.
    /// Only transport failures and timeouts are errors here.
    async fn send(&self) -> Result<UpstreamResponse>;

    /// Perform one call, treating any status >= 400 as a failure
    async fn fetch(&self) -> Result<UpstreamResponse> {
        let response = self.send().await?;
        if response.is_error() {
            return Err(Error::UpstreamStatus {
                status: response.status,
                body: response.payload.to_string(),
            });
        }
        Ok(response)
    }
}

/// HTTP upstream backed by a reqwest client with a per-call timeout
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    url: String,
}

impl HttpUpstream {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self) -> Result<UpstreamResponse> {
        let start = Instant::now();

        let result = get(&self.client, &self.url).await;

        let outcome = match &result {
            Ok(response) => response.status.to_string(),
            Err(e) => e.kind().to_string(),
        };
        metrics::record_upstream_call(&self.url, &outcome, start.elapsed().as_secs_f64());
        debug!(
            url = %self.url,
            outcome = %outcome,
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upstream call finished"
        );

        result
    }
}

async fn get(client: &reqwest::Client, url: &str) -> Result<UpstreamResponse> {
    let response = client.get(url).send().await.map_err(map_reqwest_error)?;
    let status = response.status().as_u16();

    let body = response.bytes().await.map_err(map_reqwest_error)?;
    let payload = serde_json::from_slice(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));

    Ok(UpstreamResponse { status, payload })
}

fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("Upstream request timed out: {}", e))
    } else if e.is_connect() {
        Error::Network(format!("Failed to connect to upstream: {}", e))
    } else {
        Error::Network(format!("Upstream request failed: {}", e))
    }
}

//! Resilience demo client.
//!
//! Exposes one route per resilience mode. Baseline routes call the upstream
//! directly, breaker routes go through a single process-wide
//! [`CircuitBreaker`], and retry routes go through a [`RetryExecutor`].

pub mod handlers;
pub mod types;

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryExecutor, RetryOutcome,
};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::observability::{make_request_span, request_id_middleware};
use crate::upstream::{HttpUpstream, Upstream, UpstreamResponse};
use axum::{middleware, routing::get, Router};
use handlers::*;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Largest loop size accepted unless configured otherwise
pub const DEFAULT_MAX_LOOP_COUNT: usize = 1000;

/// Shared state of the client service
#[derive(Clone)]
pub struct ClientState {
    pub upstream: Arc<dyn Upstream>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: Arc<RetryExecutor>,
    pub max_loop_count: usize,
}

impl ClientState {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        breaker_config: CircuitBreakerConfig,
        retry_config: RetryConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(upstream.url(), breaker_config);

        Self {
            upstream,
            breaker: Arc::new(breaker),
            retry: Arc::new(RetryExecutor::new(retry_config)),
            max_loop_count: DEFAULT_MAX_LOOP_COUNT,
        }
    }

    pub fn with_max_loop_count(mut self, max_loop_count: usize) -> Self {
        self.max_loop_count = max_loop_count;
        self
    }

    /// Build the state for the HTTP upstream described by `config`
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let upstream = HttpUpstream::new(config.upstream_url()?, config.timeout())?;

        Ok(Self::new(
            Arc::new(upstream),
            config.circuit_breaker(),
            config.retry(),
        )
        .with_max_loop_count(config.max_loop_count))
    }

    pub fn backend_url(&self) -> &str {
        self.upstream.url()
    }

    /// Validate the requested loop size
    pub fn loop_count(&self, n: usize) -> Result<usize> {
        if n > self.max_loop_count {
            return Err(Error::InvalidRequest(format!(
                "n must be at most {}, got {}",
                self.max_loop_count, n
            )));
        }
        Ok(n)
    }

    /// One upstream call through the circuit breaker
    pub async fn call_breaker(&self) -> Result<UpstreamResponse> {
        let upstream = self.upstream.as_ref();
        self.breaker.call(|| upstream.fetch()).await
    }

    /// One upstream call sequence through the retry executor
    pub async fn call_retry(&self) -> Result<RetryOutcome<UpstreamResponse>> {
        let upstream = self.upstream.as_ref();
        self.retry.execute(move || upstream.fetch()).await
    }
}

/// Build the client router. `/metrics` is mounted when a metrics service is given.
pub fn router(state: ClientState, metrics: Option<MetricsService>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/fetch", get(fetch_handler))
        .route("/loop", get(loop_handler))
        .route("/fetchBreaker", get(fetch_breaker_handler))
        .route("/loopBreaker", get(loop_breaker_handler))
        .route("/fetchRetry", get(fetch_retry_handler))
        .route("/loopRetry", get(loop_retry_handler))
        .route("/circuit", get(circuit_handler))
        .with_state(state);

    if let Some(service) = metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(service),
        );
    }

    app.layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
}

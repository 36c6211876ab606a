//! Simulated unreliable upstream.
//!
//! `GET /data` draws one uniform sample per request and either fails with
//! HTTP 500, answers after an injected delay, or answers immediately.

use crate::config::BackendConfig;
use crate::metrics;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// What the backend does with a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// Answer HTTP 500
    Error,
    /// Answer successfully after the given delay
    Slow(Duration),
    /// Answer successfully right away
    None,
}

/// Probability model for injected faults
#[derive(Debug, Clone)]
pub struct FaultInjector {
    error_rate: f64,
    slow_rate: f64,
    slow_min: f64,
    slow_max: f64,
}

impl FaultInjector {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            error_rate: config.error_rate,
            slow_rate: config.slow_rate,
            slow_min: config.slow_seconds_min,
            slow_max: config.slow_seconds_max,
        }
    }

    /// Draw the fault for one request.
    ///
    /// A single sample `r` decides the outcome: `r < error_rate` is an error,
    /// `r < error_rate + slow_rate` is a slow answer with a delay drawn from
    /// `[slow_min, slow_max]` seconds.
    pub fn decide<R: Rng>(&self, rng: &mut R) -> Fault {
        let r: f64 = rng.gen();

        if r < self.error_rate {
            Fault::Error
        } else if r < self.error_rate + self.slow_rate {
            let secs = if self.slow_max > self.slow_min {
                rng.gen_range(self.slow_min..=self.slow_max)
            } else {
                self.slow_min
            };
            Fault::Slow(Duration::from_secs_f64(secs.max(0.0)))
        } else {
            Fault::None
        }
    }
}

/// Build the backend router
pub fn router(injector: FaultInjector) -> Router {
    Router::new()
        .route("/data", get(data_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(injector))
        .layer(TraceLayer::new_for_http())
}

async fn data_handler(State(injector): State<Arc<FaultInjector>>) -> (StatusCode, Json<Value>) {
    let fault = injector.decide(&mut rand::thread_rng());

    match fault {
        Fault::Error => {
            debug!("Injecting HTTP 500");
            metrics::record_fault_injected("error");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal Server Error (simulated)"})),
            );
        }
        Fault::Slow(delay) => {
            debug!(delay_ms = delay.as_millis() as u64, "Injecting delay");
            metrics::record_fault_injected("slow");
            tokio::time::sleep(delay).await;
        }
        Fault::None => {}
    }

    (
        StatusCode::OK,
        Json(json!({
            "message": "Hello from Backend!",
            "note": "This endpoint randomly delays or fails for resilience testing"
        })),
    )
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

use crate::circuit_breaker::CircuitState;
use crate::error::{Error, Result};
use axum::{extract::State, http::header, response::IntoResponse};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| Error::Internal(format!("Failed to install metrics recorder: {}", e)))?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!("resilience_requests_total", "Total number of client requests");
        describe_histogram!(
            "resilience_request_duration_seconds",
            "Client request latencies in seconds"
        );

        describe_counter!(
            "resilience_upstream_calls_total",
            "Upstream calls by outcome"
        );
        describe_histogram!(
            "resilience_upstream_duration_seconds",
            "Upstream call latencies in seconds"
        );

        describe_gauge!(
            "resilience_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
        );
        describe_counter!(
            "resilience_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );
        describe_counter!(
            "resilience_circuit_breaker_rejections_total",
            "Calls rejected by an open circuit"
        );

        describe_counter!(
            "resilience_retry_attempts_total",
            "Retry executor attempts by outcome"
        );

        describe_counter!(
            "resilience_faults_injected_total",
            "Faults injected by the simulated backend"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record a client-facing request
pub fn record_request(route: &str, status: u16, duration: f64) {
    let labels = [
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];

    counter!("resilience_requests_total", &labels).increment(1);
    histogram!("resilience_request_duration_seconds", &labels).record(duration);
}

/// Record a single upstream call, `outcome` is a status code or an error kind
pub fn record_upstream_call(target: &str, outcome: &str, duration: f64) {
    let labels = [
        ("target", target.to_string()),
        ("outcome", outcome.to_string()),
    ];

    counter!("resilience_upstream_calls_total", &labels).increment(1);
    histogram!("resilience_upstream_duration_seconds", &labels).record(duration);
}

/// Record circuit breaker state
pub fn record_circuit_breaker_state(target: &str, state: CircuitState) {
    let labels = [("target", target.to_string())];
    gauge!("resilience_circuit_breaker_state", &labels).set(state.as_gauge() as f64);
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(target: &str, from: CircuitState, to: CircuitState) {
    let labels = [
        ("target", target.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
    ];
    counter!("resilience_circuit_breaker_transitions_total", &labels).increment(1);
}

pub fn record_circuit_breaker_rejection(target: &str) {
    let labels = [("target", target.to_string())];
    counter!("resilience_circuit_breaker_rejections_total", &labels).increment(1);
}

/// Record a retry executor attempt: "success", "retry" or "exhausted"
pub fn record_retry_attempt(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("resilience_retry_attempts_total", &labels).increment(1);
}

/// Record a fault injected by the simulated backend
pub fn record_fault_injected(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!("resilience_faults_injected_total", &labels).increment(1);
}

/// Timer for measuring request duration
pub struct Timer {
    start: Instant,
    route: String,
}

impl Timer {
    /// Start a new timer for a request
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            route: route.into(),
        }
    }

    /// Record the elapsed time with the given status code
    pub fn record(self, status: u16) {
        record_request(&self.route, status, self.elapsed());
    }

    /// Get the elapsed time in seconds
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_creation() {
        let timer = Timer::new("/fetch");
        assert_eq!(timer.route, "/fetch");
        assert!(timer.elapsed() >= 0.0);
    }

    #[test]
    fn test_timer_elapsed_ms_tracks_seconds() {
        let timer = Timer::new("/loop");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let ms = timer.elapsed_ms();
        assert!(ms >= 5.0);
        assert!(ms < timer.elapsed() * 1000.0 + 1.0);
    }

    #[tokio::test]
    async fn test_metrics_service_creation() {
        // Only one recorder can be installed per process
        match MetricsService::new() {
            Ok(service) => {
                record_request("/fetch", 200, 0.01);
                assert!(service.render().contains("resilience_requests_total"));
            }
            Err(e) => {
                assert!(e.to_string().contains("recorder") || e.to_string().contains("install"));
            }
        }
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_request("/fetch", 200, 0.123);
        record_upstream_call("http://backend:5001/data", "500", 0.456);
        record_circuit_breaker_state("http://backend:5001/data", CircuitState::Open);
        record_circuit_breaker_transition(
            "http://backend:5001/data",
            CircuitState::Closed,
            CircuitState::Open,
        );
        record_circuit_breaker_rejection("http://backend:5001/data");
        record_retry_attempt("retry");
        record_fault_injected("error");
    }
}

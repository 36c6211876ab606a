use super::types::{CallReport, CallStatus, LoopEntry, LoopParams, LoopReport, Mode};
use super::ClientState;
use crate::error::Error;
use crate::metrics::Timer;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn attempts_of(error: &Error) -> Option<u32> {
    match error {
        Error::RetriesExhausted { attempts, .. } => Some(*attempts),
        _ => None,
    }
}

fn respond<T: serde::Serialize>(timer: Timer, status: StatusCode, body: T) -> Response {
    timer.record(status.as_u16());
    (status, Json(body)).into_response()
}

fn reject(timer: Timer, mode: Mode, error: Error) -> Response {
    warn!(error = %error, "Rejecting loop request");
    let status = error.status_code();
    respond(timer, status, json!({"mode": mode, "error": error.to_string()}))
}

/// Single baseline call. The upstream status is passed through as-is.
pub async fn fetch_handler(State(state): State<ClientState>) -> Response {
    let timer = Timer::new("/fetch");
    let result = state.upstream.send().await;
    let mut report = CallReport::new(None, state.backend_url(), timer.elapsed_ms());

    let status = match result {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
            report.status = Some(CallStatus::Code(response.status));
            report.payload = Some(response.payload);
            status
        }
        Err(e) => {
            warn!(error = %e, "Baseline fetch failed");
            report.error = Some(e.to_string());
            e.status_code()
        }
    };

    respond(timer, status, report)
}

/// `n` sequential baseline calls
pub async fn loop_handler(
    State(state): State<ClientState>,
    Query(params): Query<LoopParams>,
) -> Response {
    let timer = Timer::new("/loop");
    let n = match state.loop_count(params.n) {
        Ok(n) => n,
        Err(e) => return reject(timer, Mode::Baseline, e),
    };
    let mut results = Vec::new();

    for i in 0..n {
        let start = Instant::now();
        let result = state.upstream.send().await;
        let mut entry = LoopEntry::new(i, elapsed_ms(start));

        match result {
            Ok(response) => entry.status = Some(CallStatus::Code(response.status)),
            Err(e) => entry.error = Some(e.to_string()),
        }
        results.push(entry);
    }

    info!(count = n, "Baseline loop finished");

    let report = LoopReport {
        mode: Mode::Baseline,
        count: n,
        backend_url: state.backend_url().to_string(),
        results,
    };
    respond(timer, StatusCode::OK, report)
}

/// Single call guarded by the circuit breaker
pub async fn fetch_breaker_handler(State(state): State<ClientState>) -> Response {
    let timer = Timer::new("/fetchBreaker");
    let result = state.call_breaker().await;
    let circuit_state = state.breaker.state().await;
    let mut report = CallReport::new(Some(Mode::Breaker), state.backend_url(), timer.elapsed_ms());
    report.circuit_state = Some(circuit_state);

    let status = match result {
        Ok(response) => {
            report.status = Some(CallStatus::Label("OK"));
            report.payload = Some(response.payload);
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, circuit_state = %circuit_state, "Breaker fetch failed");
            report.error = Some(e.to_string());
            e.status_code()
        }
    };

    respond(timer, status, report)
}

/// `n` sequential breaker-guarded calls sharing the process-wide breaker
pub async fn loop_breaker_handler(
    State(state): State<ClientState>,
    Query(params): Query<LoopParams>,
) -> Response {
    let timer = Timer::new("/loopBreaker");
    let n = match state.loop_count(params.n) {
        Ok(n) => n,
        Err(e) => return reject(timer, Mode::Breaker, e),
    };
    let mut results = Vec::new();

    for i in 0..n {
        let start = Instant::now();
        let result = state.call_breaker().await;
        let mut entry = LoopEntry::new(i, elapsed_ms(start));
        entry.circuit_state = Some(state.breaker.state().await);

        match result {
            Ok(_) => entry.status = Some(CallStatus::Label("OK")),
            Err(e) => {
                entry.status = Some(CallStatus::Label("FAILED"));
                entry.error = Some(e.to_string());
            }
        }
        results.push(entry);
    }

    info!(count = n, "Breaker loop finished");

    let report = LoopReport {
        mode: Mode::Breaker,
        count: n,
        backend_url: state.backend_url().to_string(),
        results,
    };
    respond(timer, StatusCode::OK, report)
}

/// Single call with retries and exponential backoff
pub async fn fetch_retry_handler(State(state): State<ClientState>) -> Response {
    let timer = Timer::new("/fetchRetry");
    let result = state.call_retry().await;
    let mut report = CallReport::new(Some(Mode::Retry), state.backend_url(), timer.elapsed_ms());

    let status = match result {
        Ok(outcome) => {
            report.attempt = Some(outcome.attempt);
            report.status = Some(CallStatus::Code(outcome.value.status));
            report.payload = Some(outcome.value.payload);
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, "Retry fetch failed");
            report.error = Some(e.to_string());
            e.status_code()
        }
    };

    respond(timer, status, report)
}

/// `n` sequential calls, each with its own retry sequence
pub async fn loop_retry_handler(
    State(state): State<ClientState>,
    Query(params): Query<LoopParams>,
) -> Response {
    let timer = Timer::new("/loopRetry");
    let n = match state.loop_count(params.n) {
        Ok(n) => n,
        Err(e) => return reject(timer, Mode::Retry, e),
    };
    let mut results = Vec::new();

    for i in 0..n {
        let start = Instant::now();
        let result = state.call_retry().await;
        let mut entry = LoopEntry::new(i, elapsed_ms(start));

        match result {
            Ok(outcome) => {
                entry.attempt = Some(outcome.attempt);
                entry.status = Some(CallStatus::Code(outcome.value.status));
            }
            Err(e) => {
                entry.attempt = attempts_of(&e);
                entry.error = Some(e.to_string());
            }
        }
        results.push(entry);
    }

    info!(count = n, "Retry loop finished");

    let report = LoopReport {
        mode: Mode::Retry,
        count: n,
        backend_url: state.backend_url().to_string(),
        results,
    };
    respond(timer, StatusCode::OK, report)
}

/// Current breaker state, counters and configuration
pub async fn circuit_handler(State(state): State<ClientState>) -> Response {
    Json(state.breaker.snapshot().await).into_response()
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

use super::types::{
    CircuitBreakerConfig, CircuitBreakerMetrics, CircuitSnapshot, CircuitState, StateTransition,
};
use crate::error::{Error, Result};
use crate::metrics;
use std::future::Future;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Circuit breaker guarding a single upstream target.
///
/// The mutex is held only while a call is admitted and while its outcome is
/// recorded. The wrapped operation itself runs without the lock, so concurrent
/// calls in the closed state reach the upstream in parallel.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Configuration
    config: CircuitBreakerConfig,
    /// Mutable breaker state
    state: Mutex<State>,
    /// Upstream identifier used in logs and metric labels
    target: String,
    /// State change notifications
    transitions: broadcast::Sender<StateTransition>,
}

#[derive(Debug)]
struct State {
    /// Current circuit state
    circuit_state: CircuitState,
    /// Consecutive failures since the last success
    failure_count: u32,
    /// Time of the most recent recorded failure
    last_failure_time: Option<Instant>,
    /// Start of the half-open probe currently in flight
    probe_started: Option<Instant>,
    /// Metrics
    metrics: CircuitBreakerMetrics,
}

/// How a call got past the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Admitted while closed
    Normal,
    /// The single half-open trial call
    Probe,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let target = target.into();
        info!(
            upstream = %target,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout_ms,
            "Creating circuit breaker"
        );

        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);

        Self {
            config,
            state: Mutex::new(State {
                circuit_state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                probe_started: None,
                metrics: CircuitBreakerMetrics::default(),
            }),
            target,
            transitions,
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`Error::CircuitOpen`] without invoking `operation` when the
    /// circuit is open and the recovery timeout has not elapsed, or when a
    /// half-open probe is already in flight. Otherwise the operation's own
    /// result is returned after it has been recorded.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit().await?;

        let result = operation().await;

        match &result {
            Ok(_) => self.record_success(admission).await,
            Err(e) => self.record_failure(admission, e).await,
        }

        result
    }

    /// Decide whether a call may proceed
    async fn admit(&self) -> Result<Admission> {
        let mut state = self.state.lock().await;
        let recovery_timeout = self.config.recovery_timeout();

        let admission = match state.circuit_state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => match state.last_failure_time {
                Some(failed_at) if failed_at.elapsed() >= recovery_timeout => {
                    self.transition(&mut state, CircuitState::HalfOpen);
                    Some(Admission::Probe)
                }
                Some(failed_at) => {
                    debug!(
                        upstream = %self.target,
                        time_remaining = ?recovery_timeout.saturating_sub(failed_at.elapsed()),
                        "Circuit breaker open, rejecting request"
                    );
                    None
                }
                None => {
                    warn!(upstream = %self.target, "Circuit open but no failure timestamp");
                    None
                }
            },
            CircuitState::HalfOpen => match state.probe_started {
                Some(started) if started.elapsed() < self.config.probe_deadline() => {
                    debug!(
                        upstream = %self.target,
                        "Half-open probe in flight, rejecting request"
                    );
                    None
                }
                abandoned => {
                    if abandoned.is_some() {
                        warn!(
                            upstream = %self.target,
                            "Half-open probe never reported back, admitting a new probe"
                        );
                    }
                    Some(Admission::Probe)
                }
            },
        };

        match admission {
            Some(admission) => {
                if admission == Admission::Probe {
                    state.probe_started = Some(Instant::now());
                    debug!(upstream = %self.target, "Allowing half-open probe request");
                }
                state.metrics.total_requests += 1;
                Ok(admission)
            }
            None => {
                state.metrics.rejected_requests += 1;
                metrics::record_circuit_breaker_rejection(&self.target);
                Err(Error::CircuitOpen)
            }
        }
    }

    async fn record_success(&self, admission: Admission) {
        let mut state = self.state.lock().await;
        state.metrics.successful_requests += 1;
        state.failure_count = 0;

        if admission == Admission::Probe {
            state.probe_started = None;
            if state.circuit_state == CircuitState::HalfOpen {
                self.transition(&mut state, CircuitState::Closed);
            }
        }
    }

    async fn record_failure(&self, admission: Admission, error: &Error) {
        let mut state = self.state.lock().await;
        state.metrics.failed_requests += 1;
        if matches!(error, Error::Timeout(_)) {
            state.metrics.timeout_count += 1;
        }
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(Instant::now());

        match (admission, state.circuit_state) {
            (Admission::Probe, circuit_state) => {
                state.probe_started = None;
                warn!(
                    upstream = %self.target,
                    error = %error,
                    "Half-open probe request failed, reopening circuit"
                );
                if circuit_state == CircuitState::HalfOpen {
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            (Admission::Normal, CircuitState::Closed) => {
                debug!(
                    upstream = %self.target,
                    failure_count = state.failure_count,
                    threshold = self.config.failure_threshold,
                    error = %error,
                    "Request failed in closed state"
                );
                if state.failure_count >= self.config.failure_threshold {
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            // admitted before the circuit tripped
            (Admission::Normal, circuit_state) => {
                debug!(
                    upstream = %self.target,
                    state = %circuit_state,
                    "Late failure recorded"
                );
            }
        }
    }

    fn transition(&self, state: &mut State, to: CircuitState) {
        let from = state.circuit_state;
        if from == to {
            return;
        }
        state.circuit_state = to;

        match to {
            CircuitState::Open => {
                state.metrics.circuit_opened_count += 1;
                info!(
                    upstream = %self.target,
                    failure_count = state.failure_count,
                    "Circuit breaker OPEN, requests are being blocked"
                );
            }
            CircuitState::HalfOpen => {
                state.metrics.circuit_half_opened_count += 1;
                info!(
                    upstream = %self.target,
                    recovery_timeout = ?self.config.recovery_timeout(),
                    "Circuit breaker HALF-OPEN, testing with a probe request"
                );
            }
            CircuitState::Closed => {
                state.metrics.circuit_closed_count += 1;
                info!(upstream = %self.target, "Circuit breaker CLOSED, upstream recovered");
            }
        }

        metrics::record_circuit_breaker_transition(&self.target, from, to);
        metrics::record_circuit_breaker_state(&self.target, to);
        // nobody listening is fine
        let _ = self.transitions.send(StateTransition { from, to });
    }

    /// Get current state
    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.circuit_state
    }

    /// Consecutive failures since the last success
    pub async fn failure_count(&self) -> u32 {
        self.state.lock().await.failure_count
    }

    /// Get metrics
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        self.state.lock().await.metrics.clone()
    }

    pub async fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock().await;
        CircuitSnapshot {
            target: self.target.clone(),
            state: state.circuit_state,
            failure_count: state.failure_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_ms: self.config.recovery_timeout_ms,
            metrics: state.metrics.clone(),
        }
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

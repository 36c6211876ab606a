use crate::circuit_breaker::CircuitState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resilience mode a request was served with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Baseline,
    Breaker,
    Retry,
}

/// Status reported for a call: the upstream status code, or `"OK"`/`"FAILED"`
/// in breaker mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallStatus {
    Code(u16),
    Label(&'static str),
}

/// Body of the single-call routes (`/fetch`, `/fetchBreaker`, `/fetchRetry`)
#[derive(Debug, Clone, Serialize)]
pub struct CallReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(rename = "backendUrl")]
    pub backend_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<CircuitState>,
}

impl CallReport {
    pub fn new(mode: Option<Mode>, backend_url: &str, elapsed_ms: f64) -> Self {
        Self {
            mode,
            attempt: None,
            backend_url: backend_url.to_string(),
            status: None,
            error: None,
            elapsed_ms,
            payload: None,
            circuit_state: None,
        }
    }
}

/// One iteration of a loop route
#[derive(Debug, Clone, Serialize)]
pub struct LoopEntry {
    pub i: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<CircuitState>,
}

impl LoopEntry {
    pub fn new(i: usize, elapsed_ms: f64) -> Self {
        Self {
            i,
            attempt: None,
            status: None,
            error: None,
            elapsed_ms,
            circuit_state: None,
        }
    }
}

/// Body of the loop routes
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub mode: Mode,
    pub count: usize,
    #[serde(rename = "backendUrl")]
    pub backend_url: String,
    pub results: Vec<LoopEntry>,
}

/// Query string of the loop routes
#[derive(Debug, Clone, Deserialize)]
pub struct LoopParams {
    #[serde(default = "default_loop_count")]
    pub n: usize,
}

fn default_loop_count() -> usize {
    10
}

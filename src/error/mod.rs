use axum::http::StatusCode;
use thiserror::Error;

/// Result type for resilience-lab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by the upstream client, the circuit breaker and the
/// retry executor
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection refused, DNS failure or any other transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// The per-call timeout expired before the upstream answered
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The upstream answered with a status >= 400
    #[error("HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// The breaker short-circuited the call; no upstream request was made
    #[error("Circuit breaker is OPEN")]
    CircuitOpen,

    /// Every attempt allowed by the retry policy failed
    #[error("Failed after {attempts} retries: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// The request itself is malformed or out of bounds
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code the client surface reports for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Network(_)
            | Error::Timeout(_)
            | Error::UpstreamStatus { .. }
            | Error::CircuitOpen
            | Error::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) | Error::Internal(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether an upstream call was attempted and failed
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout(_) | Error::UpstreamStatus { .. }
        )
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Network(_) => "network",
            Error::Timeout(_) => "timeout",
            Error::UpstreamStatus { .. } => "upstream_status",
            Error::CircuitOpen => "circuit_open",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
        }
    }
}

use crate::circuit_breaker::{CircuitBreakerConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::observability::TracingConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Client service configuration.
///
/// Every field maps to the upper-cased environment variable of the same name
/// (`BACKEND_HOST`, `TIMEOUT_MS`, ...). Values are read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Address the client binds to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_client_port")]
    pub port: u16,
    /// Host of the upstream backend
    #[serde(default = "default_backend_host")]
    pub backend_host: String,
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,
    /// Per-call upstream timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Largest `n` accepted by the loop routes
    #[serde(default = "default_max_loop_count")]
    pub max_loop_count: usize,
    /// OTLP collector; tracing export is disabled when unset
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub otel_sample_rate: f64,
}

/// Fault-injecting backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_backend_port")]
    pub port: u16,
    /// Probability of answering HTTP 500
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    /// Probability of answering after an injected delay
    #[serde(default = "default_slow_rate")]
    pub slow_rate: f64,
    #[serde(default = "default_slow_seconds_min")]
    pub slow_seconds_min: f64,
    #[serde(default = "default_slow_seconds_max")]
    pub slow_seconds_max: f64,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub otel_sample_rate: f64,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_client_port() -> u16 {
    5000
}

fn default_backend_host() -> String {
    "backend".to_string()
}

fn default_backend_port() -> u16 {
    5001
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_failure_threshold() -> u32 {
    CircuitBreakerConfig::default().failure_threshold
}

fn default_recovery_timeout_ms() -> u64 {
    CircuitBreakerConfig::default().recovery_timeout_ms
}

fn default_max_retries() -> u32 {
    RetryConfig::default().max_retries
}

fn default_base_delay_ms() -> u64 {
    RetryConfig::default().base_delay_ms
}

fn default_jitter_ms() -> u64 {
    RetryConfig::default().jitter_ms
}

fn default_max_loop_count() -> usize {
    1000
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_error_rate() -> f64 {
    0.1
}

fn default_slow_rate() -> f64 {
    0.2
}

fn default_slow_seconds_min() -> f64 {
    2.0
}

fn default_slow_seconds_max() -> f64 {
    6.0
}

/// Deserialize a configuration from environment-style variables.
/// `None` reads the process environment.
fn load<T: DeserializeOwned>(vars: Option<HashMap<String, String>>) -> Result<T> {
    config::Config::builder()
        .add_source(
            config::Environment::default()
                .try_parsing(true)
                .ignore_empty(true)
                .source(vars),
        )
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

fn tracing_config(
    endpoint: &Option<String>,
    sample_rate: f64,
    service_name: &str,
) -> Option<TracingConfig> {
    endpoint.as_ref().map(|endpoint| TracingConfig {
        otlp_endpoint: endpoint.clone(),
        service_name: service_name.to_string(),
        sample_rate,
        ..TracingConfig::default()
    })
}

impl ClientConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        load(None)
    }

    /// Load configuration from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        load(Some(vars))
    }

    /// URL of the upstream data endpoint
    pub fn upstream_url(&self) -> Result<String> {
        let raw = format!("http://{}:{}/data", self.backend_host, self.backend_port);
        let url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("Invalid upstream URL '{}': {}", raw, e)))?;
        Ok(url.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout_ms: self.recovery_timeout_ms,
            call_timeout_ms: Some(self.timeout_ms),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            jitter_ms: self.jitter_ms,
        }
    }

    pub fn tracing(&self) -> Option<TracingConfig> {
        tracing_config(
            &self.otel_exporter_otlp_endpoint,
            self.otel_sample_rate,
            "resilience-client",
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config("TIMEOUT_MS must be > 0".to_string()));
        }
        if self.failure_threshold == 0 {
            return Err(Error::Config("FAILURE_THRESHOLD must be > 0".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("MAX_RETRIES must be > 0".to_string()));
        }
        if self.max_loop_count == 0 {
            return Err(Error::Config("MAX_LOOP_COUNT must be > 0".to_string()));
        }
        validate_sample_rate(self.otel_sample_rate)?;
        self.upstream_url()?;

        Ok(())
    }
}

impl BackendConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        load(None)
    }

    /// Load configuration from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        load(Some(vars))
    }

    pub fn tracing(&self) -> Option<TracingConfig> {
        tracing_config(
            &self.otel_exporter_otlp_endpoint,
            self.otel_sample_rate,
            "fault-backend",
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [("ERROR_RATE", self.error_rate), ("SLOW_RATE", self.slow_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, rate
                )));
            }
        }

        if self.slow_seconds_min < 0.0 || self.slow_seconds_min > self.slow_seconds_max {
            return Err(Error::Config(format!(
                "Slow delay bounds must satisfy 0 <= SLOW_SECONDS_MIN <= SLOW_SECONDS_MAX, got [{}, {}]",
                self.slow_seconds_min, self.slow_seconds_max
            )));
        }
        validate_sample_rate(self.otel_sample_rate)?;

        Ok(())
    }
}

fn validate_sample_rate(rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(Error::Config(format!(
            "OTEL_SAMPLE_RATE must be between 0 and 1, got {}",
            rate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_client_default_values() {
        let config = ClientConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.backend_host, "backend");
        assert_eq!(config.backend_port, 5001);
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout_ms, 5000);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.jitter_ms, 200);
        assert_eq!(config.max_loop_count, 1000);
        assert_eq!(config.circuit_breaker().call_timeout_ms, Some(3000));
        assert_eq!(config.circuit_breaker().probe_deadline(), Duration::from_secs(8));
        assert!(config.tracing().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_reads_variables() {
        let config = ClientConfig::from_vars(vars(&[
            ("BACKEND_HOST", "localhost"),
            ("BACKEND_PORT", "6001"),
            ("TIMEOUT_MS", "250"),
            ("MAX_RETRIES", "3"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.upstream_url().unwrap(), "http://localhost:6001/data");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.retry().max_retries, 3);
        assert_eq!(config.circuit_breaker().failure_threshold, 5);

        let tracing = config.tracing().unwrap();
        assert_eq!(tracing.otlp_endpoint, "http://collector:4317");
        assert_eq!(tracing.service_name, "resilience-client");
    }

    #[test]
    fn test_client_rejects_unparseable_value() {
        let result = ClientConfig::from_vars(vars(&[("BACKEND_PORT", "not-a-port")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_zero_threshold() {
        let config = ClientConfig::from_vars(vars(&[("FAILURE_THRESHOLD", "0")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_loop_count() {
        let config = ClientConfig::from_vars(vars(&[("MAX_LOOP_COUNT", "0")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = ClientConfig::from_vars(vars(&[("TIMEOUT_MS", "0")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_backend_host() {
        let config = ClientConfig::from_vars(vars(&[("BACKEND_HOST", "bad host")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_default_values() {
        let config = BackendConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.port, 5001);
        assert_eq!(config.error_rate, 0.1);
        assert_eq!(config.slow_rate, 0.2);
        assert_eq!(config.slow_seconds_min, 2.0);
        assert_eq!(config.slow_seconds_max, 6.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_reads_integer_rates() {
        let config = BackendConfig::from_vars(vars(&[("ERROR_RATE", "1"), ("SLOW_RATE", "0")]))
            .unwrap();
        assert_eq!(config.error_rate, 1.0);
        assert_eq!(config.slow_rate, 0.0);
    }

    #[test]
    fn test_backend_validate_rates() {
        let config = BackendConfig::from_vars(vars(&[("ERROR_RATE", "1.5")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_validate_inverted_delay_bounds() {
        let config = BackendConfig::from_vars(vars(&[
            ("SLOW_SECONDS_MIN", "4"),
            ("SLOW_SECONDS_MAX", "1"),
        ]))
        .unwrap();
        assert!(config.validate().is_err());
    }
}

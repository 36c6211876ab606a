pub mod backend;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod upstream;

use crate::backend::FaultInjector;
use crate::client::ClientState;
use crate::config::{BackendConfig, ClientConfig};
use crate::error::{Error, Result};
use crate::metrics::{metrics_handler, MetricsService};
use axum::{routing::get, Router};
use tracing::{info, warn};

/// Start the resilience client and serve until shutdown
pub async fn init_client(config: ClientConfig) -> Result<()> {
    config.validate()?;

    let state = ClientState::from_config(&config)?;
    info!(
        upstream = %state.backend_url(),
        timeout_ms = config.timeout_ms,
        failure_threshold = config.failure_threshold,
        recovery_timeout_ms = config.recovery_timeout_ms,
        max_retries = config.max_retries,
        "Starting resilience client"
    );

    let metrics = match MetricsService::new() {
        Ok(service) => Some(service),
        Err(e) => {
            warn!(error = %e, "Metrics endpoint disabled");
            None
        }
    };

    let app = client::router(state, metrics);
    serve(&config.bind_host, config.port, app).await
}

/// Start the fault-injecting backend and serve until shutdown
pub async fn init_backend(config: BackendConfig) -> Result<()> {
    config.validate()?;

    info!(
        error_rate = config.error_rate,
        slow_rate = config.slow_rate,
        slow_seconds_min = config.slow_seconds_min,
        slow_seconds_max = config.slow_seconds_max,
        "Starting fault backend"
    );

    let mut app = backend::router(FaultInjector::new(&config));
    match MetricsService::new() {
        Ok(service) => {
            app = app.merge(
                Router::new()
                    .route("/metrics", get(metrics_handler))
                    .with_state(service),
            );
        }
        Err(e) => warn!(error = %e, "Metrics endpoint disabled"),
    }

    serve(&config.bind_host, config.port, app).await
}

async fn serve(host: &str, port: u16, app: Router) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "Ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

use anyhow::Context;
use resilience_lab::{config::BackendConfig, init_backend, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BackendConfig::from_env().context("Failed to load backend configuration")?;

    observability::init_tracing(config.tracing()).context("Failed to initialize tracing")?;

    let result = init_backend(config).await;
    observability::shutdown_telemetry();

    result.context("Backend error")
}

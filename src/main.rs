use anyhow::Context;
use resilience_lab::{config::ClientConfig, init_client, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("Failed to load client configuration")?;

    observability::init_tracing(config.tracing()).context("Failed to initialize tracing")?;

    let result = init_client(config).await;
    observability::shutdown_telemetry();

    result.context("Client error")
}

use anyhow::Context as _;
use doc_query_service::{ServiceConfig, create_app, telemetry::init_tracing};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let app = create_app(&config).context("failed to build the service")?;

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    let addr = listener.local_addr()?;

    info!("Document query service starting on {}", addr);
    info!("API overview available at http://{}/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

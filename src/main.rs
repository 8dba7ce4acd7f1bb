use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use geosearch::{app, bootstrap, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, PUB_JWKS, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config();
    tracing::info!("Starting geosearch in {:?} mode", config.environment);

    let state = bootstrap::app_state(config).await.context("failed to initialize")?;

    // Keep the catalog warm between requests
    let registry = state.engine.registry().clone();
    let delay = Duration::from_secs(config.registry.refresh_delay_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(delay);
        loop {
            ticker.tick().await;
            if let Err(e) = registry.ensure_fresh().await {
                tracing::error!("Dataset registry refresh failed: {}", e);
            }
        }
    });

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("geosearch listening on http://{}", bind_addr);
    axum::serve(listener, app(state)).await.context("server")?;
    Ok(())
}

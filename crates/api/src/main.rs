use std::sync::Arc;

use anyhow::Context;

use tradelane_infra::config::SettlementConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tradelane_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let config = SettlementConfig::from_env().context("invalid settlement configuration")?;
    tracing::info!(?config, "settlement configuration loaded");

    let services = tradelane_api::app::services::build_services(config).await?;
    let app = tradelane_api::app::build_app(jwt_secret, Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

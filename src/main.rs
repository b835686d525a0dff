//! Graph Sync Server - Binary Entry Point
//!
//! Serves the collaboration gateway on `SYNC_HOST:SYNC_PORT`.

use std::sync::Arc;

use graph_sync::api::create_router;
use graph_sync::{AppState, ServerConfig, SessionRegistry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> graph_sync::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("graph_sync=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    if config.jwt_secret.is_none() {
        warn!("SYNC_JWT_SECRET not set, handshake tokens are not verified");
    }

    let registry = Arc::new(SessionRegistry::new());
    let state = Arc::new(AppState::new(registry, config.clone()));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(
        "{} v{} listening on {}",
        graph_sync::NAME,
        graph_sync::VERSION,
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

//! Metacat server
//!
//! Boot sequence: logging, configuration, registry load (fatal on any
//! validation failure), store bootstrap, operation synthesis, then serve.

use std::net::SocketAddr;
use std::sync::Arc;

use mc_api::AppState;
use mc_core::config::AppConfig;
use mc_graph::{MemoryGraph, SessionPool};
use mc_registry::Registry;
use mc_services::OperationCatalog;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mc_server=debug,mc_services=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config_file = std::env::var("METACAT_CONFIG").ok();
    let config = AppConfig::load(config_file.as_deref())?;

    // A registry that fails validation refuses to start the process.
    let registry = Arc::new(Registry::from_path(&config.registry.path)?);
    tracing::info!(path = %config.registry.path, "registry loaded");

    let store = Arc::new(MemoryGraph::new());
    let pool = Arc::new(SessionPool::new(store, &config.graph));

    let catalog = Arc::new(OperationCatalog::synthesize(
        Arc::clone(&registry),
        pool,
        &config,
    ));
    catalog.bootstrap().await?;

    let app = mc_api::router(AppState::new(catalog));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("starting metacat on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("metacat stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {err}");
        return;
    }
    tracing::info!("shutdown signal received");
}

use std::sync::Arc;

use anyhow::Context;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use nex_registry::api::create_router;
use nex_registry::config::Config;
use nex_registry::db::{self, MemoryStore, PackageStore, PgStore};
use nex_registry::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Nex registry v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().map_err(anyhow::Error::msg)?;
    tracing::info!("Configuration loaded successfully");

    let store: Arc<dyn PackageStore> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let pool = db::create_pool(&config.database_url).context("creating database pool")?;
        tracing::info!("Database connection pool created");
        db::run_migrations(&pool).await.context("running migrations")?;
        Arc::new(PgStore::new(pool))
    };

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set; publishing and token issuance need a stored admin token");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let addr = format!("{}:{}", config.host, config.port);
    let app = create_router(AppState::new(store, config))
        .layer(cors)
        .layer(CompressionLayer::new());

    tracing::info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

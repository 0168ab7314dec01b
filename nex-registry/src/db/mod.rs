pub mod error;
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

use deadpool_postgres::{Pool, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use queries::PgStore;
pub use store::PackageStore;

/// `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_URL: &str = "memory://";

pub fn create_pool(database_url: &str) -> StoreResult<Pool> {
    let mut cfg = deadpool_postgres::Config::new();
    cfg.url = Some(database_url.to_string());
    let tls_connector = TlsConnector::builder()
        .build()
        .map_err(|e| StoreError::Config(format!("TLS setup failed: {}", e)))?;
    let make_tls = MakeTlsConnector::new(tls_connector);
    cfg.create_pool(Some(Runtime::Tokio1), make_tls)
        .map_err(|e| StoreError::Config(format!("pool setup failed: {}", e)))
}

pub async fn run_migrations(pool: &Pool) -> StoreResult<()> {
    let client = pool.get().await?;

    let migration_sql = include_str!("../../migrations/001_init.sql");
    client.batch_execute(migration_sql).await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

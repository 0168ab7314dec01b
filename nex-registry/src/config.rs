use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Bootstrap admin credential; accepted in place of an issued token.
    pub admin_token: Option<String>,
    /// Directory of prebuilt web assets served for unmatched paths.
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| "DATABASE_URL must be set (use memory:// for an in-process store)")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            static_dir: env::var("STATIC_DIR").ok().filter(|d| !d.is_empty()).map(PathBuf::from),
        })
    }

    /// Configuration for an in-process registry, used by tests and local runs.
    pub fn in_memory(admin_token: Option<&str>) -> Self {
        Config {
            database_url: crate::db::MEMORY_URL.to_string(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            admin_token: admin_token.map(str::to_string),
            static_dir: None,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == crate::db::MEMORY_URL
    }
}

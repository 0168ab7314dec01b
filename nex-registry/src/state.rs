//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::db::PackageStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PackageStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn PackageStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

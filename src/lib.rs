pub mod catalog;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Shared application state passed to all Axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub catalogs: Arc<catalog::CatalogRegistry>,
    /// Cancelled on shutdown; every audit runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: config::AppConfig, catalogs: Arc<catalog::CatalogRegistry>) -> Self {
        Self {
            config,
            catalogs,
            shutdown: CancellationToken::new(),
        }
    }
}

//! Route definitions for the audit service.

pub mod audit;
pub mod catalogs;
pub mod health;
pub mod home;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::AppState;

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let cors = match state.config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new().allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, url = %state.config.frontend_url, "Invalid FRONTEND_URL; CORS disabled");
            CorsLayer::new()
        }
    }
    .allow_methods([Method::GET, Method::POST])
    .allow_headers(Any);

    let api_routes = Router::new()
        .route("/audits", post(audit::submit_json))
        .route("/catalogs", get(catalogs::list))
        .route("/catalogs/{engine}/{standard}", get(catalogs::get));

    Router::new()
        .route("/", get(home::index))
        .route("/audit", post(audit::submit_form))
        .route("/audit/", post(audit::submit_form))
        .route("/audit_database", post(audit::submit_form))
        .route("/audit_database/", post(audit::submit_form))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .nest("/api/v1", api_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_request_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

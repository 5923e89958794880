//! Health check endpoint
//!
//! `/health` answers without authentication, for load balancers and liveness checks.

use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}

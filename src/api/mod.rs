//! Web API module for ContextTree
//!
//! Provides REST API endpoints for:
//! - Canvas, node and edge CRUD scoped to the caller
//! - Debounced and immediate canvas saves
//! - Active user limits and administration
//! - Bug reports

pub mod autosave;
pub mod bug_reports;
pub mod canvases;
pub mod health;
pub mod limits;
pub mod response;

use axum::{Extension, Router};
use contexttree_canvas::{AutoSaveCoordinator, BugReportStore, CanvasStore};
use contexttree_core::{ActiveUserLimiter, AuthStore};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::user_limit::UserLimitLayer;

pub use autosave::autosave_routes;
pub use bug_reports::bug_reports_routes;
pub use canvases::canvases_routes;
pub use health::health_routes;
pub use limits::limits_routes;

/// Services shared by all API handlers
#[derive(Clone)]
pub struct AppState {
    pub canvases: Arc<dyn CanvasStore>,
    pub bug_reports: Arc<dyn BugReportStore>,
    pub autosave: AutoSaveCoordinator,
    pub limiter: Arc<ActiveUserLimiter>,
}

/// Create the `/api/v1` router. Every route passes the active user limit.
pub fn api_router(state: AppState) -> Router {
    let limiter = state.limiter.clone();

    Router::new()
        .merge(canvases_routes())
        .merge(autosave_routes())
        .merge(limits_routes())
        .merge(bug_reports_routes())
        .with_state(state)
        .layer(UserLimitLayer::new(limiter))
}

/// Create the full application: health, API, tracing and CORS
pub fn app(state: AppState, auth_store: Arc<AuthStore>) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(api_router(state))
        .layer(Extension(auth_store))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

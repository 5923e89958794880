//! Active user limit endpoints
//!
//! POST   /api/v1/activity                        - Heartbeat, refreshes the caller's activity
//! GET    /api/v1/limits                          - Limiter utilization
//! GET    /api/v1/admin/active-users              - List active identities (admin)
//! DELETE /api/v1/admin/active-users/:identity    - Evict an identity (admin)

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use contexttree_core::{ActiveUserInfo, LimiterStats, Scope};
use serde::Serialize;
use tracing::info;

use super::response::{ApiError, ApiResponse, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireAuth;

/// Heartbeat response
#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    /// Whether the caller is counted as active
    pub active: bool,
}

/// Eviction response
#[derive(Debug, Serialize)]
pub struct EvictionResponse {
    pub identity: String,
    pub removed: bool,
}

/// Refresh the caller's last-seen time.
async fn record_activity(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
) -> ApiResult<ActivityResponse> {
    let active = state.limiter.update_user_activity(&auth.user_id).await;
    Ok(Json(ApiResponse::success(ActivityResponse { active })))
}

/// Current limiter utilization.
async fn limiter_stats(
    RequireAuth(_auth): RequireAuth,
    State(state): State<AppState>,
) -> ApiResult<LimiterStats> {
    Ok(Json(ApiResponse::success(state.limiter.stats().await)))
}

/// List active identities.
async fn list_active_users(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
) -> ApiResult<Vec<ActiveUserInfo>> {
    auth.require_scope(&Scope::Admin)?;
    Ok(Json(ApiResponse::success(state.limiter.active_users().await)))
}

/// Evict an identity immediately.
async fn evict_user(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<EvictionResponse> {
    auth.require_scope(&Scope::Admin)?;
    if !state.limiter.remove_user(&identity).await {
        return Err(ApiError::not_found(format!("{} is not active", identity)));
    }
    info!(identity = %identity, admin = %auth.user_id, "Active user evicted");
    Ok(Json(ApiResponse::success(EvictionResponse {
        identity,
        removed: true,
    })))
}

/// Create limit routes
pub fn limits_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/activity", post(record_activity))
        .route("/api/v1/limits", get(limiter_stats))
        .route("/api/v1/admin/active-users", get(list_active_users))
        .route("/api/v1/admin/active-users/:identity", delete(evict_user))
}

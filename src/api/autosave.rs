//! Auto-save API endpoints
//!
//! PUT  /api/v1/canvases/:id/autosave - Schedule a debounced save
//! POST /api/v1/canvases/:id/save     - Save immediately
//! GET  /api/v1/canvases/:id/autosave - Auto-save status

use axum::{
    extract::{Path, State},
    routing::{post, put},
    Json, Router,
};
use contexttree_canvas::document::{validate_edges, validate_nodes};
use contexttree_canvas::{AutoSaveStatus, CanvasEdge, CanvasNode, SaveOutcome, ScheduleOutcome};
use contexttree_core::Scope;
use serde::{Deserialize, Serialize};

use super::response::{ApiJson, ApiResponse, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireAuth;

/// Full editor contents at a given revision
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasContents {
    /// Editor revision, bumped on every mutation
    pub revision: u64,
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
}

impl CanvasContents {
    fn validate(&self) -> contexttree_canvas::Result<()> {
        validate_nodes(&self.nodes)?;
        validate_edges(&self.edges)
    }
}

/// Response to a schedule request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    /// Whether a save timer was (re)started
    pub scheduled: bool,
    pub revision: u64,
    /// Quiet period before the write
    pub delay_ms: u64,
}

/// Schedule a debounced save. Invalid contents are rejected up front so a
/// bad payload never sits in the pending slot.
async fn schedule_save(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(contents): ApiJson<CanvasContents>,
) -> ApiResult<ScheduleResponse> {
    auth.require_scope(&Scope::CanvasWrite)?;
    contents.validate()?;

    let revision = contents.revision;
    let outcome = state
        .autosave
        .schedule(&auth.user_id, &id, revision, contents.nodes, contents.edges)
        .await;

    Ok(Json(ApiResponse::success(ScheduleResponse {
        scheduled: outcome == ScheduleOutcome::Scheduled,
        revision,
        delay_ms: state.autosave.delay().as_millis() as u64,
    })))
}

/// Save immediately, cancelling any pending timer.
async fn save_now(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(contents): ApiJson<CanvasContents>,
) -> ApiResult<SaveOutcome> {
    auth.require_scope(&Scope::CanvasWrite)?;
    contents.validate()?;

    let outcome = state
        .autosave
        .save_now(
            &auth.user_id,
            &id,
            contents.revision,
            contents.nodes,
            contents.edges,
        )
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Auto-save status of a canvas.
async fn autosave_status(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AutoSaveStatus> {
    auth.require_scope(&Scope::CanvasRead)?;
    let status = state.autosave.status(&auth.user_id, &id).await;
    Ok(Json(ApiResponse::success(status)))
}

/// Create auto-save routes
pub fn autosave_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/canvases/:id/autosave",
            put(schedule_save).get(autosave_status),
        )
        .route("/api/v1/canvases/:id/save", post(save_now))
}

//! Canvases API endpoints
//!
//! GET    /api/v1/canvases                        - List the caller's canvases
//! POST   /api/v1/canvases                        - Create a canvas
//! GET    /api/v1/canvases/:id                    - Get a canvas
//! PATCH  /api/v1/canvases/:id                    - Update title, contents, viewport or note
//! DELETE /api/v1/canvases/:id                    - Delete a canvas
//! POST   /api/v1/canvases/:id/nodes              - Add a node
//! PUT    /api/v1/canvases/:id/nodes/:node_id     - Replace a node
//! DELETE /api/v1/canvases/:id/nodes/:node_id     - Remove a node and its edges
//! POST   /api/v1/canvases/:id/edges              - Add an edge
//! PUT    /api/v1/canvases/:id/edges/:edge_id     - Replace an edge
//! DELETE /api/v1/canvases/:id/edges/:edge_id     - Remove an edge

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use contexttree_canvas::{Canvas, CanvasEdge, CanvasNode, CanvasPatch, CanvasSummary, NewCanvas};
use contexttree_core::Scope;
use serde::Serialize;
use tracing::info;

use super::response::{ApiError, ApiJson, ApiResponse, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireAuth;

/// Response for deletions
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub id: String,
    /// Unsaved auto-save contents were dropped along with the canvas
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub discarded_unsaved: bool,
}

/// List canvases owned by the requester.
async fn list_canvases(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
) -> ApiResult<Vec<CanvasSummary>> {
    auth.require_scope(&Scope::CanvasRead)?;
    let canvases = state.canvases.list_canvases(&auth.user_id).await?;
    Ok(Json(ApiResponse::success(canvases)))
}

/// Create a canvas with a client-supplied ID.
async fn create_canvas(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewCanvas>,
) -> ApiResult<Canvas> {
    auth.require_scope(&Scope::CanvasWrite)?;
    let canvas = state.canvases.create_canvas(request, &auth.user_id).await?;
    info!(canvas_id = %canvas.id, owner = %auth.user_id, "Canvas created");
    Ok(Json(ApiResponse::success(canvas)))
}

/// Get a canvas.
async fn get_canvas(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Canvas> {
    auth.require_scope(&Scope::CanvasRead)?;
    let canvas = state.canvases.get_canvas(&id, &auth.user_id).await?;
    Ok(Json(ApiResponse::success(canvas)))
}

/// Apply a partial update.
async fn update_canvas(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<CanvasPatch>,
) -> ApiResult<Canvas> {
    auth.require_scope(&Scope::CanvasWrite)?;
    if patch.is_empty() {
        return Err(ApiError::bad_request("Patch contains no fields"));
    }
    let canvas = state.canvases.update_canvas(&id, patch, &auth.user_id).await?;
    Ok(Json(ApiResponse::success(canvas)))
}

/// Delete a canvas and drop its pending auto-save.
async fn delete_canvas(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    auth.require_scope(&Scope::CanvasWrite)?;
    state.canvases.delete_canvas(&id, &auth.user_id).await?;
    let discarded_unsaved = state.autosave.discard(&auth.user_id, &id).await;
    info!(canvas_id = %id, owner = %auth.user_id, "Canvas deleted");
    Ok(Json(ApiResponse::success(Deleted {
        id,
        discarded_unsaved,
    })))
}

/// Add a node.
async fn add_node(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(node): ApiJson<CanvasNode>,
) -> ApiResult<CanvasNode> {
    auth.require_scope(&Scope::CanvasWrite)?;
    let node = state.canvases.add_node(&id, node, &auth.user_id).await?;
    Ok(Json(ApiResponse::success(node)))
}

/// Replace a node; the body ID must match the path.
async fn update_node(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
    ApiJson(node): ApiJson<CanvasNode>,
) -> ApiResult<CanvasNode> {
    auth.require_scope(&Scope::CanvasWrite)?;
    ensure_same_id("node", &node_id, &node.id)?;
    let node = state.canvases.update_node(&id, node, &auth.user_id).await?;
    Ok(Json(ApiResponse::success(node)))
}

/// Remove a node together with its edges.
async fn remove_node(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
) -> ApiResult<CanvasNode> {
    auth.require_scope(&Scope::CanvasWrite)?;
    let node = state
        .canvases
        .remove_node(&id, &node_id, &auth.user_id)
        .await?;
    Ok(Json(ApiResponse::success(node)))
}

/// Add an edge.
async fn add_edge(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(edge): ApiJson<CanvasEdge>,
) -> ApiResult<CanvasEdge> {
    auth.require_scope(&Scope::CanvasWrite)?;
    let edge = state.canvases.add_edge(&id, edge, &auth.user_id).await?;
    Ok(Json(ApiResponse::success(edge)))
}

/// Replace an edge; the body ID must match the path.
async fn update_edge(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path((id, edge_id)): Path<(String, String)>,
    ApiJson(edge): ApiJson<CanvasEdge>,
) -> ApiResult<CanvasEdge> {
    auth.require_scope(&Scope::CanvasWrite)?;
    ensure_same_id("edge", &edge_id, &edge.id)?;
    let edge = state.canvases.update_edge(&id, edge, &auth.user_id).await?;
    Ok(Json(ApiResponse::success(edge)))
}

/// Remove an edge.
async fn remove_edge(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    Path((id, edge_id)): Path<(String, String)>,
) -> ApiResult<CanvasEdge> {
    auth.require_scope(&Scope::CanvasWrite)?;
    let edge = state
        .canvases
        .remove_edge(&id, &edge_id, &auth.user_id)
        .await?;
    Ok(Json(ApiResponse::success(edge)))
}

fn ensure_same_id(what: &str, path_id: &str, body_id: &str) -> Result<(), ApiError> {
    if path_id != body_id {
        return Err(ApiError::bad_request(format!(
            "{} id in body ({}) does not match path ({})",
            what, body_id, path_id
        )));
    }
    Ok(())
}

/// Create canvases routes
pub fn canvases_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/canvases", get(list_canvases).post(create_canvas))
        .route(
            "/api/v1/canvases/:id",
            get(get_canvas).patch(update_canvas).delete(delete_canvas),
        )
        .route("/api/v1/canvases/:id/nodes", post(add_node))
        .route(
            "/api/v1/canvases/:id/nodes/:node_id",
            put(update_node).delete(remove_node),
        )
        .route("/api/v1/canvases/:id/edges", post(add_edge))
        .route(
            "/api/v1/canvases/:id/edges/:edge_id",
            put(update_edge).delete(remove_edge),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{test_auth, test_state};
    use axum::http::StatusCode;
    use contexttree_canvas::{NodeKind, Position};

    fn entry() -> CanvasNode {
        CanvasNode::new("entry", NodeKind::Entry, Position::default()).primary()
    }

    async fn create(state: &AppState, id: &str) {
        create_canvas(
            test_auth("ada"),
            State(state.clone()),
            ApiJson(NewCanvas::empty(id, "Research")),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_list_canvases() {
        let state = test_state();
        create(&state, "c1").await;

        let response = list_canvases(test_auth("ada"), State(state.clone()))
            .await
            .unwrap();
        assert!(response.0.success);
        let canvases = response.0.data.unwrap();
        assert_eq!(canvases.len(), 1);
        assert_eq!(canvases[0].title, "Research");

        let response = list_canvases(test_auth("bob"), State(state)).await.unwrap();
        assert!(response.0.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_other_owners_canvas_is_not_found() {
        let state = test_state();
        create(&state, "c1").await;

        let err = get_canvas(test_auth("bob"), State(state), Path("c1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_node_without_lineage_is_bad_request() {
        let state = test_state();
        create(&state, "c1").await;

        let orphan = CanvasNode::new("m1", NodeKind::Message, Position::default());
        let err = add_node(
            test_auth("ada"),
            State(state),
            Path("c1".to_string()),
            ApiJson(orphan),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_node_id_mismatch() {
        let state = test_state();
        create(&state, "c1").await;
        add_node(
            test_auth("ada"),
            State(state.clone()),
            Path("c1".to_string()),
            ApiJson(entry()),
        )
        .await
        .unwrap();

        let err = update_node(
            test_auth("ada"),
            State(state),
            Path(("c1".to_string(), "other".to_string())),
            ApiJson(entry()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_remove_node_drops_edges() {
        let state = test_state();
        create(&state, "c1").await;

        let branch = CanvasNode::new("b1", NodeKind::Branch, Position::default())
            .forked_from("entry", "msg-1");
        for node in [entry(), branch] {
            add_node(
                test_auth("ada"),
                State(state.clone()),
                Path("c1".to_string()),
                ApiJson(node),
            )
            .await
            .unwrap();
        }
        add_edge(
            test_auth("ada"),
            State(state.clone()),
            Path("c1".to_string()),
            ApiJson(CanvasEdge::new("e1", "entry", "b1")),
        )
        .await
        .unwrap();

        remove_node(
            test_auth("ada"),
            State(state.clone()),
            Path(("c1".to_string(), "b1".to_string())),
        )
        .await
        .unwrap();

        let canvas = get_canvas(test_auth("ada"), State(state), Path("c1".to_string()))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        assert_eq!(canvas.nodes.len(), 1);
        assert!(canvas.edges.is_empty());
    }

    #[tokio::test]
    async fn test_empty_patch_is_rejected() {
        let state = test_state();
        create(&state, "c1").await;

        let err = update_canvas(
            test_auth("ada"),
            State(state),
            Path("c1".to_string()),
            ApiJson(CanvasPatch::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_canvas() {
        let state = test_state();
        create(&state, "c1").await;

        let response = delete_canvas(
            test_auth("ada"),
            State(state.clone()),
            Path("c1".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(response.0.data.unwrap().id, "c1");

        let err = delete_canvas(test_auth("ada"), State(state), Path("c1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}

//! Bug report endpoints
//!
//! POST /api/v1/bug-reports - File a bug report
//! GET  /api/v1/bug-reports - List the caller's bug reports

use axum::{extract::State, routing::get, Json, Router};
use contexttree_canvas::{BugReport, NewBugReport};
use contexttree_core::Scope;
use tracing::info;

use super::response::{ApiJson, ApiResponse, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireAuth;

/// File a bug report.
async fn create_bug_report(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewBugReport>,
) -> ApiResult<BugReport> {
    auth.require_scope(&Scope::ReportWrite)?;
    let report = request.into_report(&auth.user_id)?;
    let report = state.bug_reports.create_bug_report(report).await?;
    info!(
        report_id = %report.id,
        reporter = %report.reporter,
        severity = report.severity.as_str(),
        "Bug report filed"
    );
    Ok(Json(ApiResponse::success(report)))
}

/// List bug reports filed by the requester.
async fn list_bug_reports(
    RequireAuth(auth): RequireAuth,
    State(state): State<AppState>,
) -> ApiResult<Vec<BugReport>> {
    auth.require_scope(&Scope::ReportWrite)?;
    let reports = state.bug_reports.list_bug_reports(&auth.user_id).await?;
    Ok(Json(ApiResponse::success(reports)))
}

/// Create bug report routes
pub fn bug_reports_routes() -> Router<AppState> {
    Router::new().route(
        "/api/v1/bug-reports",
        get(list_bug_reports).post(create_bug_report),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{test_auth, test_state};
    use axum::http::StatusCode;
    use contexttree_canvas::Severity;

    fn request(title: &str) -> NewBugReport {
        NewBugReport {
            title: title.to_string(),
            description: "Minimap stops following the viewport".to_string(),
            severity: Severity::Low,
            canvas_id: None,
            context: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_file_and_list() {
        let state = test_state();
        create_bug_report(test_auth("ada"), State(state.clone()), ApiJson(request("Minimap")))
            .await
            .unwrap();

        let mine = list_bug_reports(test_auth("ada"), State(state.clone()))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].reporter, "ada");

        let theirs = list_bug_reports(test_auth("bob"), State(state))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn test_blank_title_is_bad_request() {
        let state = test_state();
        let err = create_bug_report(test_auth("ada"), State(state), ApiJson(request(" ")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

//! Response envelope and error mapping shared by all API handlers

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use contexttree_core::AuthError;
use serde::Serialize;
use tracing::error;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: &'static str) -> ApiResponse<T> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
        }
    }
}

/// Handler error rendered as an [`ApiResponse`] with a matching status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

/// Result type returned by handlers
pub type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

/// JSON request body whose rejection is rendered in the error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "VALIDATION_FAILED")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND")
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[cfg(test)]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.message, self.code);
        (self.status, Json(body)).into_response()
    }
}

impl From<contexttree_canvas::Error> for ApiError {
    fn from(err: contexttree_canvas::Error) -> Self {
        use contexttree_canvas::Error;

        let status = match &err {
            Error::CanvasNotFound(_) | Error::NodeNotFound { .. } | Error::EdgeNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Database(_) | Error::Serialization(_) | Error::Internal(_) => {
                error!(error = %err, "Canvas store failure");
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage failure, please retry",
                    err.code(),
                );
            }
        };
        Self::new(status, err.to_string(), err.code())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientScope { required } => Self::new(
                StatusCode::FORBIDDEN,
                format!("Insufficient permissions. Required scope: {}", required),
                "FORBIDDEN",
            ),
            AuthError::Internal(msg) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg, "INTERNAL_ERROR")
            }
            other => Self::new(StatusCode::UNAUTHORIZED, other.to_string(), "UNAUTHORIZED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contexttree_canvas::Error;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::CanvasNotFound("c1".to_string()), StatusCode::NOT_FOUND),
            (Error::conflict("dup"), StatusCode::CONFLICT),
            (Error::validation("lineage"), StatusCode::BAD_REQUEST),
            (Error::database("locked"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_store_failure_hides_details() {
        let err = ApiError::from(Error::database("no such table: canvases"));
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(!err.message.contains("canvases"));
    }

    #[test]
    fn test_scope_error_is_forbidden() {
        let err = ApiError::from(AuthError::InsufficientScope {
            required: "admin".to_string(),
        });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_json_rejection_is_bad_request() {
        let err = ApiError::from(JsonRejection::from(
            axum::extract::rejection::MissingJsonContentType::default(),
        ));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_error_envelope() {
        let body = serde_json::to_value(ApiResponse::<()>::error("nope", "CONFLICT")).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "CONFLICT");
        assert!(body.get("data").is_none());
    }
}

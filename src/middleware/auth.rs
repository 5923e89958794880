//! Authentication middleware for Axum
//!
//! Resolves the caller's identity from a Bearer session token or from the
//! trusted proxy header, and provides the `RequireAuth` extractor for handlers.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use contexttree_core::{AuthContext, AuthError, AuthStore};
use serde::Serialize;
use std::sync::Arc;

/// JSON error response for auth failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl AuthErrorResponse {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Auth rejection type
pub struct AuthRejection {
    status: StatusCode,
    body: AuthErrorResponse,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => AuthRejection {
                status: StatusCode::UNAUTHORIZED,
                body: AuthErrorResponse::new(
                    "Authentication required. Sign in and retry.",
                    "UNAUTHORIZED",
                ),
            },
            AuthError::InvalidCredentials => AuthRejection {
                status: StatusCode::UNAUTHORIZED,
                body: AuthErrorResponse::new("Invalid session token", "INVALID_CREDENTIALS"),
            },
            AuthError::InsufficientScope { required } => AuthRejection {
                status: StatusCode::FORBIDDEN,
                body: AuthErrorResponse::new(
                    format!("Insufficient permissions. Required scope: {}", required),
                    "FORBIDDEN",
                ),
            },
            AuthError::Internal(msg) => AuthRejection {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: AuthErrorResponse::new(msg, "INTERNAL_ERROR"),
            },
        }
    }
}

/// Resolve the caller's identity from request headers.
///
/// Sources, in order:
/// 1. `Authorization: Bearer <token>` session token
/// 2. The trusted proxy identity header, when configured
pub fn authenticate(store: &AuthStore, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    if !store.is_enabled() {
        return Ok(AuthContext::anonymous());
    }

    if let Some(token) = bearer_token(headers) {
        return store.validate_token(token);
    }

    if let Some(header) = store.proxy_header() {
        if let Some(identity) = headers.get(header).and_then(|v| v.to_str().ok()) {
            return store.authenticate_proxy_identity(identity);
        }
    }

    Err(AuthError::MissingCredentials)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

// ============================================================================
// RequireAuth Extractor
// ============================================================================

/// Axum extractor that requires an authenticated identity.
///
/// Reuses the context resolved by the user limit layer when present.
pub struct RequireAuth(pub AuthContext);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<AuthContext>() {
            return Ok(RequireAuth(ctx.clone()));
        }

        let auth_store = parts
            .extensions
            .get::<Arc<AuthStore>>()
            .ok_or_else(|| AuthError::Internal("AuthStore not configured".to_string()))?;

        let ctx = authenticate(auth_store, &parts.headers)?;
        Ok(RequireAuth(ctx))
    }
}

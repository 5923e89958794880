//! Active user limiting middleware for Axum
//!
//! Wraps the `ActiveUserLimiter` from contexttree-core as an Axum layer.
//! Each request's identity is resolved once, checked against the active
//! user ceiling, and attached to the request for `RequireAuth`.
//! Requests without a valid identity pass through and are rejected by the
//! handler's extractor instead.

use axum::{
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use contexttree_core::{AccessDecision, ActiveUserLimiter, AuthStore};
use serde::Serialize;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::auth::authenticate;

/// Error code of the limiter denial
pub const USER_LIMIT_REACHED: &str = "USER_LIMIT_REACHED";

// ============================================================================
// Denial Response
// ============================================================================

#[derive(Debug, Serialize)]
struct UserLimitResponse {
    success: bool,
    error: String,
    code: &'static str,
}

fn denied_response(message: String) -> Response {
    let body = UserLimitResponse {
        success: false,
        error: message,
        code: USER_LIMIT_REACHED,
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

// ============================================================================
// Axum Layer
// ============================================================================

/// Active user limiting layer for Axum
#[derive(Clone)]
pub struct UserLimitLayer {
    limiter: Arc<ActiveUserLimiter>,
}

impl UserLimitLayer {
    /// Create a new user limit layer
    pub fn new(limiter: Arc<ActiveUserLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for UserLimitLayer {
    type Service = UserLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

// ============================================================================
// Axum Service
// ============================================================================

/// Active user limiting service wrapper
#[derive(Clone)]
pub struct UserLimitService<S> {
    inner: S,
    limiter: Arc<ActiveUserLimiter>,
}

type BoxFuture<T, E> =
    std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send>>;

impl<S, B> Service<Request<B>> for UserLimitService<S>
where
    S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> BoxFuture<Response, S::Error> {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(auth_store) = req.extensions().get::<Arc<AuthStore>>().cloned() else {
                return inner.call(req).await;
            };

            let ctx = match authenticate(&auth_store, req.headers()) {
                Ok(ctx) => ctx,
                Err(e) => {
                    debug!(error = %e, "Unauthenticated request reached user limit layer");
                    return inner.call(req).await;
                }
            };

            match limiter.can_user_access(&ctx.user_id).await {
                AccessDecision::Allowed { .. } => {
                    req.extensions_mut().insert(ctx);
                    inner.call(req).await
                }
                AccessDecision::Denied { message } => {
                    warn!(identity = %ctx.user_id, "Request denied by active user limit");
                    Ok(denied_response(message))
                }
            }
        })
    }
}

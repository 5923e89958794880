//! ContextTree Core
//!
//! Request-independent building blocks shared by the ContextTree server:
//! - Auth: session token validation and trusted proxy identities
//! - Limiter: cap on concurrently active user identities
//! - Shutdown: coordinated cancellation of background tasks
//! - Error: configuration and internal errors

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod limiter;
pub mod shutdown;

pub use auth::{AuthContext, AuthError, AuthMethod, AuthStore, Scope};
pub use error::{Error, Result};
pub use limiter::{
    AccessDecision, ActiveUserInfo, ActiveUserLimiter, LimiterConfig, LimiterStats,
};
pub use shutdown::{shutdown_signal_with_controller, wait_for_shutdown_signal, ShutdownController};

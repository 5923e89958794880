//! Middleware module for the ContextTree HTTP server
//!
//! Provides:
//! - Authentication (Bearer session token / trusted proxy header)
//! - Active user limiting

pub mod auth;
pub mod user_limit;

//! Error types for contexttree-canvas
//!
//! This module provides error types for the canvas system,
//! including validation, ownership and storage errors.

use thiserror::Error;

/// Canvas error type
#[derive(Debug, Error)]
pub enum Error {
    /// Canvas not found (or owned by someone else)
    #[error("canvas not found: {0}")]
    CanvasNotFound(String),

    /// Node not found in the canvas
    #[error("node not found: {node_id} in canvas {canvas_id}")]
    NodeNotFound {
        /// Canvas ID
        canvas_id: String,
        /// Node ID
        node_id: String,
    },

    /// Edge not found in the canvas
    #[error("edge not found: {edge_id} in canvas {canvas_id}")]
    EdgeNotFound {
        /// Canvas ID
        canvas_id: String,
        /// Edge ID
        edge_id: String,
    },

    /// Entity with the same identifier already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Payload rejected at the write boundary
    #[error("validation failed: {0}")]
    Validation(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a database error
    #[must_use]
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Whether retrying the same operation later may succeed
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Whether the error means the addressed entity does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CanvasNotFound(_) | Self::NodeNotFound { .. } | Self::EdgeNotFound { .. }
        )
    }

    /// Get error code for API responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CanvasNotFound(_) => "CANVAS_NOT_FOUND",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::EdgeNotFound { .. } => "EDGE_NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for canvas operations
pub type Result<T> = std::result::Result<T, Error>;

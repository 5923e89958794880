//! Authentication and Authorization module
//!
//! ContextTree never runs a login flow itself. Identities come from an
//! external session provider in one of two shapes:
//! - Session tokens issued by the provider and registered here (stored hashed)
//! - A trusted identity header set by an authenticating reverse proxy
//!
//! Scopes gate what an identity may do once resolved.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Identity used for every request while authentication is disabled
pub const ANONYMOUS_USER: &str = "anonymous";

// ============================================================================
// Error Types
// ============================================================================

/// Authentication/Authorization errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credentials provided
    #[error("Authentication required")]
    MissingCredentials,

    /// Invalid token or identity
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Insufficient permissions
    #[error("Insufficient scope: requires {required}")]
    InsufficientScope {
        /// The scope that was required
        required: String,
    },

    /// Internal error
    #[error("Auth internal error: {0}")]
    Internal(String),
}

/// Auth result type
pub type Result<T> = std::result::Result<T, AuthError>;

// ============================================================================
// Scopes
// ============================================================================

/// Scope-based authorization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Full access, including limiter administration
    Admin,
    /// Read own canvases
    CanvasRead,
    /// Create, modify and delete own canvases
    CanvasWrite,
    /// File bug reports
    ReportWrite,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Admin => write!(f, "admin"),
            Scope::CanvasRead => write!(f, "canvas_read"),
            Scope::CanvasWrite => write!(f, "canvas_write"),
            Scope::ReportWrite => write!(f, "report_write"),
        }
    }
}

/// Scopes granted to a regular signed-in user
pub fn default_user_scopes() -> Vec<Scope> {
    vec![Scope::CanvasRead, Scope::CanvasWrite, Scope::ReportWrite]
}

/// Scopes granted to an administrator
pub fn admin_scopes() -> Vec<Scope> {
    vec![Scope::Admin]
}

// ============================================================================
// Auth Method / Context
// ============================================================================

/// How the caller's identity was established
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Authorization: Bearer <token>` session token
    SessionToken,
    /// Identity header injected by a trusted reverse proxy
    ProxyHeader {
        /// Header the identity was read from
        header: String,
    },
    /// Authentication disabled
    Anonymous,
}

/// Authenticated context attached to each request
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Verified identity (email or provider user id)
    pub user_id: String,
    /// How the identity was established
    pub method: AuthMethod,
    /// Granted scopes
    pub scopes: Vec<Scope>,
}

impl AuthContext {
    /// Context used while authentication is disabled
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            user_id: ANONYMOUS_USER.to_string(),
            method: AuthMethod::Anonymous,
            scopes: admin_scopes(),
        }
    }

    /// Check if this context has a specific scope
    pub fn has_scope(&self, scope: &Scope) -> bool {
        self.scopes.contains(&Scope::Admin) || self.scopes.contains(scope)
    }

    /// Require a specific scope, returning error if missing
    pub fn require_scope(&self, scope: &Scope) -> Result<()> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope {
                required: scope.to_string(),
            })
        }
    }
}

// ============================================================================
// Stored Token
// ============================================================================

#[derive(Debug, Clone)]
struct StoredToken {
    /// SHA-256 hash of the token (the raw token is never kept)
    token_hash: [u8; 32],
    user_id: String,
    label: String,
}

// ============================================================================
// Auth Store
// ============================================================================

/// Session token storage and identity resolution
pub struct AuthStore {
    /// token_hash_hex → StoredToken
    tokens: RwLock<HashMap<String, StoredToken>>,
    /// Identities that receive the admin scope
    admins: HashSet<String>,
    /// Trusted identity header, when a reverse proxy authenticates for us
    proxy_header: Option<String>,
    enabled: bool,
}

impl AuthStore {
    /// Create a new auth store
    pub fn new(enabled: bool) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            admins: HashSet::new(),
            proxy_header: None,
            enabled,
        }
    }

    /// Grant the admin scope to the given identities
    #[must_use]
    pub fn with_admins<I, S>(mut self, admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admins = admins.into_iter().map(Into::into).collect();
        self
    }

    /// Trust an identity header set by an authenticating proxy
    #[must_use]
    pub fn with_proxy_header(mut self, header: impl Into<String>) -> Self {
        self.proxy_header = Some(header.into().to_ascii_lowercase());
        self
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Trusted proxy header name (lowercase), if configured
    pub fn proxy_header(&self) -> Option<&str> {
        self.proxy_header.as_deref()
    }

    fn hash_token(token: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    fn hash_to_hex(hash: &[u8; 32]) -> String {
        hash.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn scopes_for(&self, user_id: &str) -> Vec<Scope> {
        if self.admins.contains(user_id) {
            admin_scopes()
        } else {
            default_user_scopes()
        }
    }

    /// Register a session token issued by the external provider.
    ///
    /// Returns the hex token hash. Registering the same token again replaces
    /// its owner.
    pub fn register_token(&self, token: &str, user_id: &str, label: &str) -> Result<String> {
        if token.trim().is_empty() || user_id.trim().is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let token_hash = Self::hash_token(token);
        let token_hash_hex = Self::hash_to_hex(&token_hash);

        let stored = StoredToken {
            token_hash,
            user_id: user_id.to_string(),
            label: label.to_string(),
        };

        let mut tokens = self
            .tokens
            .write()
            .map_err(|e| AuthError::Internal(format!("Lock poisoned: {}", e)))?;
        tokens.insert(token_hash_hex.clone(), stored);

        info!(user_id = %user_id, label = %label, "Session token registered");
        Ok(token_hash_hex)
    }

    /// Validate a session token and return the auth context
    pub fn validate_token(&self, token: &str) -> Result<AuthContext> {
        if !self.enabled {
            return Ok(AuthContext::anonymous());
        }

        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let token_hash = Self::hash_token(token);
        let token_hash_hex = Self::hash_to_hex(&token_hash);

        let tokens = self
            .tokens
            .read()
            .map_err(|e| AuthError::Internal(format!("Lock poisoned: {}", e)))?;

        let Some(stored) = tokens.get(&token_hash_hex) else {
            warn!("Invalid token attempt");
            return Err(AuthError::InvalidCredentials);
        };

        let hashes_match: bool = stored.token_hash.ct_eq(&token_hash).into();
        if !hashes_match {
            return Err(AuthError::InvalidCredentials);
        }

        debug!(user_id = %stored.user_id, label = %stored.label, "Token validated");

        Ok(AuthContext {
            user_id: stored.user_id.clone(),
            method: AuthMethod::SessionToken,
            scopes: self.scopes_for(&stored.user_id),
        })
    }

    /// Build a context from the trusted proxy header value
    pub fn authenticate_proxy_identity(&self, identity: &str) -> Result<AuthContext> {
        if !self.enabled {
            return Ok(AuthContext::anonymous());
        }

        let Some(header) = self.proxy_header.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };

        let identity = identity.trim();
        if identity.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        Ok(AuthContext {
            user_id: identity.to_string(),
            method: AuthMethod::ProxyHeader {
                header: header.to_string(),
            },
            scopes: self.scopes_for(identity),
        })
    }

    /// Count of registered tokens
    pub fn active_token_count(&self) -> usize {
        self.tokens.read().map(|tokens| tokens.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests;

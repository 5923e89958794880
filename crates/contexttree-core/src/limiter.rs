//! Active user limiter
//!
//! Caps the number of distinct identities that may use the service at the
//! same time. An identity becomes active on its first access check, stays
//! active while it keeps calling, and is evicted by a periodic sweep once it
//! has been idle longer than the inactivity timeout.
//!
//! Admission is first-come-first-served up to the ceiling. Expired entries
//! are only reaped by the sweep, so [`ActiveUserLimiter::stats`] may overcount
//! for at most one sweep interval.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ============================================================================
// Config
// ============================================================================

/// Limiter configuration (deserializable from TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Enable the active user ceiling
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of concurrently active identities
    #[serde(default = "default_max_active_users")]
    pub max_active_users: usize,
    /// Idle time after which an identity stops counting as active
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// How often the sweep evicts idle identities
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_active_users() -> usize {
    100
}
fn default_inactivity_timeout_secs() -> u64 {
    30 * 60
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_active_users: default_max_active_users(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl LimiterConfig {
    /// Create a config with the given ceiling and default timings
    #[must_use]
    pub fn with_max_active_users(max_active_users: usize) -> Self {
        Self {
            max_active_users,
            ..Self::default()
        }
    }

    /// Inactivity timeout as a duration
    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    /// Sweep interval as a duration
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject settings the limiter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_active_users == 0 {
            return Err(Error::invalid_config(
                "limiter.max_active_users",
                "must be at least 1",
            ));
        }
        if self.inactivity_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "limiter.inactivity_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::invalid_config(
                "limiter.sweep_interval_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of an access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The identity may proceed
    Allowed {
        /// True when this check admitted a previously absent identity
        newly_admitted: bool,
    },
    /// The ceiling is reached and the identity is not active
    Denied {
        /// Human-readable explanation for the caller
        message: String,
    },
}

impl AccessDecision {
    /// Whether access was granted
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Denial message, if denied
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Allowed { .. } => None,
            Self::Denied { message } => Some(message),
        }
    }
}

/// Limiter utilization snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStats {
    /// Identities currently counted as active
    pub active_users: usize,
    /// Configured ceiling
    pub max_users: usize,
    /// `active_users / max_users` as a percentage
    pub utilization_percent: f64,
    /// Whether new identities are being turned away
    pub at_limit: bool,
}

/// Administrative view of one active identity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUserInfo {
    /// User identity
    pub identity: String,
    /// Seconds since the last access check
    pub idle_secs: u64,
    /// Seconds since admission
    pub active_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct ActiveUserEntry {
    admitted_at: Instant,
    last_seen: Instant,
}

// ============================================================================
// Limiter
// ============================================================================

/// In-memory cap on concurrently active identities
#[derive(Debug)]
pub struct ActiveUserLimiter {
    config: LimiterConfig,
    /// identity → activity timestamps
    entries: RwLock<HashMap<String, ActiveUserEntry>>,
}

impl ActiveUserLimiter {
    /// Create a new limiter
    #[must_use]
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Limiter configuration
    #[must_use]
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Check whether `identity` may use the service, admitting it if there is room.
    ///
    /// An already active identity is always allowed and its last-seen time
    /// is refreshed.
    pub async fn can_user_access(&self, identity: &str) -> AccessDecision {
        if !self.config.enabled {
            return AccessDecision::Allowed {
                newly_admitted: false,
            };
        }

        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(identity) {
            entry.last_seen = now;
            return AccessDecision::Allowed {
                newly_admitted: false,
            };
        }

        if entries.len() < self.config.max_active_users {
            entries.insert(
                identity.to_string(),
                ActiveUserEntry {
                    admitted_at: now,
                    last_seen: now,
                },
            );
            debug!(
                identity = %identity,
                active_users = entries.len(),
                max_users = self.config.max_active_users,
                "User admitted"
            );
            return AccessDecision::Allowed {
                newly_admitted: true,
            };
        }

        warn!(
            identity = %identity,
            max_users = self.config.max_active_users,
            "Active user limit reached"
        );
        AccessDecision::Denied {
            message: format!(
                "ContextTree is at capacity ({} active users). Please try again in a few minutes.",
                self.config.max_active_users
            ),
        }
    }

    /// Refresh last-seen for an already active identity.
    ///
    /// Returns false (and does nothing) when the identity is not active.
    pub async fn update_user_activity(&self, identity: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(identity) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Current utilization
    pub async fn stats(&self) -> LimiterStats {
        let active_users = self.entries.read().await.len();
        let max_users = self.config.max_active_users;
        let utilization_percent = if max_users == 0 {
            100.0
        } else {
            active_users as f64 / max_users as f64 * 100.0
        };

        LimiterStats {
            active_users,
            max_users,
            utilization_percent,
            at_limit: self.config.enabled && active_users >= max_users,
        }
    }

    /// Evict an identity immediately. Returns whether it was active.
    pub async fn remove_user(&self, identity: &str) -> bool {
        let removed = self.entries.write().await.remove(identity).is_some();
        if removed {
            info!(identity = %identity, "User evicted from active set");
        }
        removed
    }

    /// Whether an identity is currently counted as active
    pub async fn is_active(&self, identity: &str) -> bool {
        self.entries.read().await.contains_key(identity)
    }

    /// Active identities, most recently seen first
    pub async fn active_users(&self) -> Vec<ActiveUserInfo> {
        let now = Instant::now();
        let entries = self.entries.read().await;

        let mut users: Vec<ActiveUserInfo> = entries
            .iter()
            .map(|(identity, entry)| ActiveUserInfo {
                identity: identity.clone(),
                idle_secs: now.duration_since(entry.last_seen).as_secs(),
                active_secs: now.duration_since(entry.admitted_at).as_secs(),
            })
            .collect();
        users.sort_by(|a, b| a.idle_secs.cmp(&b.idle_secs).then(a.identity.cmp(&b.identity)));
        users
    }

    /// Evict identities idle longer than the inactivity timeout.
    ///
    /// Returns the number of evicted identities.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let timeout = self.config.inactivity_timeout();

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_seen) <= timeout);
        let evicted = before - entries.len();

        if evicted > 0 {
            info!(
                evicted,
                active_users = entries.len(),
                "Swept inactive users"
            );
        }
        evicted
    }

    /// Spawn the periodic sweep, stopped by `cancel`
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Active user sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        limiter.sweep_expired().await;
                    }
                }
            }
        })
    }
}

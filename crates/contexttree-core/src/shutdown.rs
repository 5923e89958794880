//! Graceful Shutdown
//!
//! A single controller hands out cancellation tokens to background tasks and
//! cancels them all once the server receives Ctrl+C or SIGTERM. The limiter
//! sweep is the only token holder. Auto-save timers are not cancelled here;
//! the server drains them with `flush_all` and `shutdown` after the listener
//! stops.
//!
//! ## Usage
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//! let sweeper = limiter.spawn_sweeper(shutdown.token());
//!
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(shutdown_signal_with_controller(shutdown.clone()))
//!     .await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shutdown controller for coordinating graceful shutdown
#[derive(Debug)]
pub struct ShutdownController {
    cancel_token: CancellationToken,
    shutdown_initiated: AtomicBool,
}

impl ShutdownController {
    /// Create a new shutdown controller
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            shutdown_initiated: AtomicBool::new(false),
        })
    }

    /// Get a cancellation token for a component
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Check if shutdown has been initiated
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Cancel every token handed out. Only the first call has an effect.
    pub fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        info!("Initiating graceful shutdown...");
        self.cancel_token.cancel();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Shutdown signal future that integrates with [`ShutdownController`]
pub async fn shutdown_signal_with_controller(controller: Arc<ShutdownController>) {
    wait_for_shutdown_signal().await;
    controller.shutdown();
}

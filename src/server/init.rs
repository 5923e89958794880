//! Server initialization
//!
//! Contains the main `run()` function that starts all server components,
//! and `check()` which validates configuration and storage without serving.

use super::config::{AppConfig, AuthConfig, DatabaseConfig, StoreBackend};
use super::loader::load_config;
use super::validation::validate_production_config;
use crate::api::{self, AppState};
use anyhow::{Context, Result};
use contexttree_canvas::{
    AutoSaveCoordinator, BugReportStore, CanvasStore, MemoryCanvasStore, SqliteCanvasStore,
};
use contexttree_core::{
    shutdown_signal_with_controller, ActiveUserLimiter, AuthStore, ShutdownController,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Canvas and bug report storage backed by the same store
pub(crate) struct Stores {
    pub canvases: Arc<dyn CanvasStore>,
    pub bug_reports: Arc<dyn BugReportStore>,
}

/// Open the configured store, creating the schema if needed
pub(crate) async fn open_stores(config: &DatabaseConfig) -> Result<Stores> {
    match config.backend()? {
        StoreBackend::Memory => {
            warn!("Using in-memory canvas store; canvases are lost on restart");
            let store = Arc::new(MemoryCanvasStore::new());
            Ok(Stores {
                canvases: store.clone(),
                bug_reports: store,
            })
        }
        StoreBackend::Sqlite(url) => {
            let store = SqliteCanvasStore::connect(&url)
                .await
                .with_context(|| format!("Failed to open canvas database {}", url))?;
            store
                .init()
                .await
                .context("Failed to initialize canvas schema")?;
            let store = Arc::new(store);
            Ok(Stores {
                canvases: store.clone(),
                bug_reports: store,
            })
        }
    }
}

/// Build the auth store from configuration, registering configured tokens
pub(crate) fn build_auth_store(config: &AuthConfig) -> Result<AuthStore> {
    let mut store = AuthStore::new(config.enabled).with_admins(config.admins.iter().cloned());
    if config.trust_proxy_header {
        store = store.with_proxy_header(config.proxy_header.clone());
    }

    for entry in &config.tokens {
        store
            .register_token(&entry.token, &entry.user_id, &entry.label)
            .with_context(|| format!("Invalid session token entry for {}", entry.user_id))?;
    }

    if !config.enabled {
        warn!("Authentication is disabled; every request acts as the anonymous admin");
    }
    Ok(store)
}

fn load_and_validate() -> Result<AppConfig> {
    let config = load_config()?;
    config.validate()?;
    validate_production_config(&config);
    Ok(config)
}

/// Run the server
pub async fn run() -> Result<()> {
    let config = load_and_validate()?;

    let stores = open_stores(&config.database).await?;
    let auth_store = Arc::new(build_auth_store(&config.server.auth)?);
    info!(
        tokens = auth_store.active_token_count(),
        proxy_header = auth_store.proxy_header().unwrap_or("-"),
        "Auth store ready"
    );

    let shutdown_controller = ShutdownController::new();

    let limiter = Arc::new(ActiveUserLimiter::new(config.limiter.clone()));
    let sweeper = limiter.spawn_sweeper(shutdown_controller.token());
    info!(
        enabled = config.limiter.enabled,
        max_active_users = config.limiter.max_active_users,
        inactivity_timeout_secs = config.limiter.inactivity_timeout_secs,
        "Active user limiter enabled"
    );

    let autosave = AutoSaveCoordinator::from_config(stores.canvases.clone(), &config.autosave);

    let state = AppState {
        canvases: stores.canvases,
        bug_reports: stores.bug_reports,
        autosave: autosave.clone(),
        limiter,
    };
    let app = api::app(state, auth_store);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("HTTP server listening on http://{}", addr);

    let server_shutdown = shutdown_controller.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_controller(server_shutdown))
        .await;

    drain(&shutdown_controller, &autosave, sweeper).await;
    served.context("HTTP server error")?;

    info!("ContextTree shutdown complete");
    Ok(())
}

/// Stop background tasks and write out pending canvases.
///
/// Runs however the server stopped, including on its own error path.
pub(crate) async fn drain(
    controller: &ShutdownController,
    autosave: &AutoSaveCoordinator,
    sweeper: JoinHandle<()>,
) {
    controller.shutdown();

    let flushed = autosave.flush_all().await;
    let dropped = autosave.shutdown().await;
    info!(flushed, dropped, "Auto-save drained");

    match tokio::time::timeout(Duration::from_secs(5), sweeper).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Limiter sweeper task error: {}", e),
        Err(_) => warn!("Limiter sweeper shutdown timeout"),
    }
}

/// Validate configuration and storage connectivity without serving
pub async fn check() -> Result<()> {
    let config = load_and_validate()?;
    let auth_store = build_auth_store(&config.server.auth)?;

    let stores = open_stores(&config.database).await?;
    stores
        .canvases
        .list_canvases(contexttree_core::auth::ANONYMOUS_USER)
        .await
        .context("Canvas store is not answering queries")?;

    println!("Configuration OK");
    println!("  listen:        {}:{}", config.server.host, config.server.port);
    println!("  database:      {:?}", config.database.backend()?);
    println!(
        "  auth:          {} ({} tokens, proxy header: {})",
        if auth_store.is_enabled() { "enabled" } else { "disabled" },
        auth_store.active_token_count(),
        auth_store.proxy_header().unwrap_or("off")
    );
    println!(
        "  limiter:       {} (max {} users, {}s idle timeout)",
        if config.limiter.enabled { "enabled" } else { "disabled" },
        config.limiter.max_active_users,
        config.limiter.inactivity_timeout_secs
    );
    println!("  autosave:      {}ms debounce", config.autosave.delay_ms);
    Ok(())
}

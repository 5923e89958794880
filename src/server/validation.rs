//! Production configuration validation
//!
//! Security checks for production deployments.

use super::config::AppConfig;
use tracing::warn;

/// Warn about settings that are unsafe in production. Returns the number of
/// warnings emitted.
pub fn validate_production_config(config: &AppConfig) -> usize {
    let is_production = std::env::var("CONTEXTTREE_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false);

    if !is_production {
        return 0;
    }

    production_warnings(config)
        .into_iter()
        .inspect(|message| warn!("SECURITY WARNING: {}", message))
        .count()
}

fn production_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let auth = &config.server.auth;
    let exposed = config.server.host != "127.0.0.1" && config.server.host != "localhost";

    if !auth.enabled && exposed {
        warnings.push(
            "Authentication is DISABLED while the server is exposed externally. \
             Every caller is treated as an admin."
                .to_string(),
        );
    }

    if auth.trust_proxy_header && exposed {
        warnings.push(format!(
            "Trusting the {} header while binding to {}. Only the authenticating proxy \
             must be able to reach this port.",
            auth.proxy_header, config.server.host
        ));
    }

    if auth.enabled && !auth.trust_proxy_header && auth.tokens.is_empty() {
        warnings.push(
            "Authentication is enabled but no session tokens or proxy header are configured; \
             every API request will be rejected."
                .to_string(),
        );
    }

    if config.database.url.trim().eq_ignore_ascii_case("memory") {
        warnings.push("Canvases are kept in memory and lost on restart.".to_string());
    }

    if !config.limiter.enabled {
        warnings.push("The active user limiter is disabled.".to_string());
    }

    warnings
}

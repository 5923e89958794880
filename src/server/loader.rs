//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let env = std::env::var("CONTEXTTREE_ENV").unwrap_or_else(|_| "development".to_string());

    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority)
        // CONTEXTTREE_SERVER__PORT: single `_` after the prefix, `__` between keys
        .add_source(
            Environment::with_prefix("CONTEXTTREE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_deserialize() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8787);
        assert_eq!(config.limiter.max_active_users, 100);
        assert_eq!(config.limiter.inactivity_timeout_secs, 1800);
        assert_eq!(config.autosave.delay_ms, 10_000);
        assert!(config.server.auth.tokens.is_empty());
        assert!(config.validate().is_ok());
    }
}

//! Server configuration types
//!
//! Contains all configuration structures for the ContextTree server.

use anyhow::{bail, Context, Result};
use contexttree_canvas::AutoSaveConfig;
use contexttree_core::LimiterConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub autosave: AutoSaveConfig,
}

impl AppConfig {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        self.limiter
            .validate()
            .context("Invalid [limiter] configuration")?;
        self.autosave
            .validate()
            .context("Invalid [autosave] configuration")?;
        if self.server.auth.trust_proxy_header && self.server.auth.proxy_header.trim().is_empty() {
            bail!("server.auth.proxy_header must be set when trust_proxy_header is enabled");
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Enable authentication
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Accept the identity header set by an authenticating proxy
    #[serde(default)]
    pub trust_proxy_header: bool,
    /// Header carrying the proxy-verified identity
    #[serde(default = "default_proxy_header")]
    pub proxy_header: String,
    /// Identities granted the admin scope
    #[serde(default)]
    pub admins: Vec<String>,
    /// Session tokens issued by the identity provider
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

fn default_true() -> bool {
    true
}

fn default_proxy_header() -> String {
    "X-Auth-Request-Email".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_proxy_header: false,
            proxy_header: default_proxy_header(),
            admins: Vec::new(),
            tokens: Vec::new(),
        }
    }
}

/// A pre-registered session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
    #[serde(default = "default_token_label")]
    pub label: String,
}

fn default_token_label() -> String {
    "config".to_string()
}

/// Canvas database configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `memory`, a `sqlite:` URL, or empty for the platform data directory
    #[serde(default)]
    pub url: String,
}

/// Where canvases are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite(String),
}

impl DatabaseConfig {
    /// Resolve the configured URL into a backend
    pub fn backend(&self) -> Result<StoreBackend> {
        let url = self.url.trim();
        if url.eq_ignore_ascii_case("memory") {
            return Ok(StoreBackend::Memory);
        }
        if url.is_empty() {
            let path = default_database_path()?;
            return Ok(StoreBackend::Sqlite(format!("sqlite://{}", path.display())));
        }
        if !url.starts_with("sqlite:") {
            bail!("database.url must be \"memory\" or a sqlite: URL, got {}", url);
        }
        Ok(StoreBackend::Sqlite(url.to_string()))
    }
}

fn default_database_path() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("Could not determine the platform data directory; set database.url")?
        .join("contexttree");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    Ok(dir.join("contexttree.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.server.auth.enabled);
        assert_eq!(config.server.auth.proxy_header, "X-Auth-Request-Email");
        assert_eq!(config.autosave.delay_ms, 10_000);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let mut config = AppConfig::default();
        config.limiter.max_active_users = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_proxy_header_is_rejected() {
        let mut config = AppConfig::default();
        config.server.auth.trust_proxy_header = true;
        config.server.auth.proxy_header = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_backend() {
        let memory = DatabaseConfig {
            url: "memory".to_string(),
        };
        assert_eq!(memory.backend().unwrap(), StoreBackend::Memory);

        let sqlite = DatabaseConfig {
            url: "sqlite://data/ct.db".to_string(),
        };
        assert_eq!(
            sqlite.backend().unwrap(),
            StoreBackend::Sqlite("sqlite://data/ct.db".to_string())
        );

        let mongo = DatabaseConfig {
            url: "mongodb://localhost".to_string(),
        };
        assert!(mongo.backend().is_err());
    }
}

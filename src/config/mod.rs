use crate::api::CredentialScope;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete console configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Backend connection
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Which credential listing to read (`public` or `admin`)
    #[serde(default)]
    pub credential_scope: CredentialScope,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            credential_scope: CredentialScope::default(),
        }
    }
}

/// Background revalidation cadence
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_credentials_revalidate")]
    pub credentials_revalidate_secs: u64,
    /// Indexing statuses move while runs progress, so they poll faster
    #[serde(default = "default_statuses_revalidate")]
    pub statuses_revalidate_secs: u64,
}

fn default_credentials_revalidate() -> u64 {
    30
}

fn default_statuses_revalidate() -> u64 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            credentials_revalidate_secs: default_credentials_revalidate(),
            statuses_revalidate_secs: default_statuses_revalidate(),
        }
    }
}

impl CacheConfig {
    pub fn credentials_every(&self) -> Duration {
        Duration::from_secs(self.credentials_revalidate_secs.max(1))
    }

    pub fn statuses_every(&self) -> Duration {
        Duration::from_secs(self.statuses_revalidate_secs.max(1))
    }
}

impl ConsoleConfig {
    /// Load from `path` when given, otherwise defaults; then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => load_config(path)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Overrides from `CONSOLE_*` variables. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("CONSOLE_API_URL") {
            if !v.trim().is_empty() {
                self.api.base_url = v.trim().to_string();
            }
        }
        if let Some(v) = var("CONSOLE_REVALIDATE_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.cache.credentials_revalidate_secs = n;
                self.cache.statuses_revalidate_secs = n;
            }
        }
        if let Some(v) = var("CONSOLE_ADMIN_CREDENTIALS") {
            if let Ok(b) = v.parse::<bool>() {
                self.api.credential_scope = if b {
                    CredentialScope::Admin
                } else {
                    CredentialScope::Public
                };
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<ConsoleConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ConsoleConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

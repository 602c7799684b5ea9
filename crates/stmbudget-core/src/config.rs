//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: backend
//! base URL, cache and retry tuning, the offline worker's version tag and
//! static asset manifest, and the offline-mode flag.
//!
//! Configuration is stored at `~/.config/stmbudget/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "stmbudget";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `base_url`
const ENV_BASE_URL: &str = "STMBUDGET_BASE_URL";

/// Environment variable forcing offline mode ("1"/"true")
const ENV_OFFLINE: &str = "STMBUDGET_OFFLINE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub max_cache_entries: usize,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_background_refreshes: usize,
    pub batch_concurrency: usize,
    pub durable_cache: bool,
    pub cache_version: String,
    pub static_manifest: Vec<String>,
    pub offline_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            cache_ttl_secs: 300,
            max_cache_entries: 100,
            request_timeout_ms: 10_000,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_cap_ms: 10_000,
            max_background_refreshes: 2,
            batch_concurrency: 3,
            durable_cache: true,
            cache_version: "v1".to_string(),
            static_manifest: default_static_manifest(),
            offline_mode: false,
        }
    }
}

/// Critical assets pre-cached by the offline worker at install time
fn default_static_manifest() -> Vec<String> {
    [
        "/",
        "/dashboard/",
        "/static/css/main.css",
        "/static/js/app.js",
        "/static/img/logo.svg",
        "/offline/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `STMBUDGET_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.is_empty() {
                self.base_url = Some(url);
            }
        }
        if let Ok(flag) = std::env::var(ENV_OFFLINE) {
            self.offline_mode = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

//! Client configuration.
//!
//! Stored at `~/.config/schoolsync/config.json`. Every field has a default,
//! so a missing or partial file is fine. `SCHOOLSYNC_API_URL` overrides the
//! stored base address.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::cache::DEFAULT_REFERENCE_TTL_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "schoolsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const API_URL_ENV: &str = "SCHOOLSYNC_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// One day
const DEFAULT_SESSION_MAX_AGE_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub reference_ttl_secs: u64,
    /// A persisted session older than this is not resumed. `None` disables the check.
    pub session_max_age_minutes: Option<i64>,
    pub persist_session: bool,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            reference_ttl_secs: DEFAULT_REFERENCE_TTL_SECS,
            session_max_age_minutes: Some(DEFAULT_SESSION_MAX_AGE_MINUTES),
            persist_session: true,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(url = %url, "API base URL overridden from environment");
            self.api_base_url = url.trim().to_string();
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reference_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(std::time::Duration::from_secs(self.reference_ttl_secs))
            .unwrap_or_else(|_| chrono::Duration::days(365))
    }

    pub fn session_max_age(&self) -> Option<chrono::Duration> {
        self.session_max_age_minutes.and_then(chrono::Duration::try_minutes)
    }
}

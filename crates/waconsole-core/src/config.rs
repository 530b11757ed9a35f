//! Session configuration.
//!
//! Loaded from `~/.config/waconsole/config.json` when present; every field
//! has a default. `WACONSOLE_API_URL` overrides the API base URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::store::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS};
use crate::auth::{TokenInspector, TokenTtls, EXPIRY_BUFFER_SECS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "waconsole";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const API_URL_ENV: &str = "WACONSOLE_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 5 * 60;

/// Where tokens are kept between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    #[default]
    File,
    Memory,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub expiry_buffer_secs: i64,
    pub watchdog_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub token_store: TokenStoreKind,
    pub last_email: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_ttl_secs: ACCESS_TOKEN_TTL_SECS,
            refresh_ttl_secs: REFRESH_TOKEN_TTL_SECS,
            expiry_buffer_secs: EXPIRY_BUFFER_SECS,
            watchdog_interval_secs: DEFAULT_WATCHDOG_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_store: TokenStoreKind::default(),
            last_email: None,
        }
    }
}

impl SessionConfig {
    /// Load from the standard location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&Self::config_path()?)?;
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
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
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Record `email` as the last login in the config file at the standard
    /// location.
    pub fn remember_email(email: &str) -> Result<()> {
        Self::remember_email_at(&Self::config_path()?, email)
    }

    /// Update `last_email` in the file at `path`, leaving every other stored
    /// value as it is on disk. Environment overrides are never written back,
    /// and a file that fails to parse is left untouched.
    pub fn remember_email_at(path: &Path, email: &str) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.last_email = Some(email.to_string());
        config.save_to(path)
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        self
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

    pub fn token_ttls(&self) -> TokenTtls {
        TokenTtls {
            access: chrono::Duration::seconds(self.access_ttl_secs),
            refresh: chrono::Duration::seconds(self.refresh_ttl_secs),
        }
    }

    pub fn inspector(&self) -> TokenInspector {
        TokenInspector::new(chrono::Duration::seconds(self.expiry_buffer_secs))
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.token_ttls(), TokenTtls::default());
        assert_eq!(config.inspector(), TokenInspector::default());
        assert_eq!(config.watchdog_interval(), Duration::from_secs(300));
        assert_eq!(config.token_store, TokenStoreKind::File);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"api_base_url":"https://wa.example.com/api","token_store":"keyring"}"#)
                .unwrap();
        assert_eq!(config.api_base_url, "https://wa.example.com/api");
        assert_eq!(config.token_store, TokenStoreKind::Keyring);
        assert_eq!(config.access_ttl_secs, 900);
        assert_eq!(config.refresh_ttl_secs, 7_776_000);
    }

    #[test]
    fn test_env_override() {
        let config = SessionConfig::default().with_overrides(|key| {
            (key == API_URL_ENV).then(|| "https://staging.example.com/api".to_string())
        });
        assert_eq!(config.api_base_url, "https://staging.example.com/api");

        let untouched = SessionConfig::default().with_overrides(|_| Some("  ".to_string()));
        assert_eq!(untouched.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir()
            .join(format!("waconsole-config-{}", std::process::id()))
            .join(CONFIG_FILE);
        let config = SessionConfig {
            last_email: Some("ops@example.com".into()),
            watchdog_interval_secs: 60,
            ..SessionConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(SessionConfig::load_from(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_remember_email_keeps_file_values() {
        let path = std::env::temp_dir()
            .join(format!("waconsole-config-remember-{}", std::process::id()))
            .join(CONFIG_FILE);
        let on_disk = SessionConfig {
            api_base_url: "https://wa.example.com/api".into(),
            ..SessionConfig::default()
        };
        on_disk.save_to(&path).unwrap();

        SessionConfig::remember_email_at(&path, "ops@example.com").unwrap();

        let saved = SessionConfig::load_from(&path).unwrap();
        assert_eq!(saved.last_email.as_deref(), Some("ops@example.com"));
        assert_eq!(saved.api_base_url, "https://wa.example.com/api");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_remember_email_leaves_unparsable_file_alone() {
        let path = std::env::temp_dir()
            .join(format!("waconsole-config-broken-{}", std::process::id()))
            .join(CONFIG_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(SessionConfig::remember_email_at(&path, "ops@example.com").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("waconsole-does-not-exist").join(CONFIG_FILE);
        assert_eq!(SessionConfig::load_from(&path).unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_zero_watchdog_interval_is_clamped() {
        let config = SessionConfig {
            watchdog_interval_secs: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.watchdog_interval(), Duration::from_secs(1));
    }
}

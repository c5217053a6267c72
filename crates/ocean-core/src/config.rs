//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! API domain, refresh scheduling and where tokens are kept.
//!
//! Configuration is stored at `~/.config/ocean/config.json`. The
//! `OCEAN_API_DOMAIN` and `OCEAN_TOKEN_BACKEND` environment variables
//! override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::{DecodePolicy, FileStore, KeyringStore, SessionOptions, TokenStorage};
use crate::auth::session::{DEFAULT_REFRESH_INTERVAL, DEFAULT_REFRESH_LEAD, MIN_REFRESH_DELAY};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "ocean";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_DOMAIN: &str = "http://localhost:8080";

pub const API_DOMAIN_ENV: &str = "OCEAN_API_DOMAIN";
pub const TOKEN_BACKEND_ENV: &str = "OCEAN_TOKEN_BACKEND";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenBackend {
    /// `tokens.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

impl TokenBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Some(TokenBackend::File),
            "keyring" | "keychain" => Some(TokenBackend::Keyring),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_domain: Option<String>,
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    pub refresh_lead_secs: u64,
    pub decode_policy: DecodePolicy,
    pub token_backend: TokenBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_domain: None,
            auto_refresh: true,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
            refresh_lead_secs: DEFAULT_REFRESH_LEAD.as_secs(),
            decode_policy: DecodePolicy::default(),
            token_backend: TokenBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
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

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(domain) = var(API_DOMAIN_ENV).filter(|d| !d.trim().is_empty()) {
            self.api_domain = Some(domain);
        }
        if let Some(backend) = var(TOKEN_BACKEND_ENV).as_deref().and_then(TokenBackend::parse) {
            self.token_backend = backend;
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

    pub fn api_domain(&self) -> &str {
        self.api_domain.as_deref().unwrap_or(DEFAULT_API_DOMAIN)
    }

    /// Session options from the config. The fallback interval never drops
    /// below the minimum refresh delay.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auto_refresh: self.auto_refresh,
            refresh_interval: Duration::from_millis(self.refresh_interval_ms).max(MIN_REFRESH_DELAY),
            refresh_lead: Duration::from_secs(self.refresh_lead_secs),
            decode_policy: self.decode_policy,
            ..SessionOptions::default()
        }
    }

    /// Token storage on the configured backend.
    pub fn token_storage(&self) -> Result<TokenStorage> {
        Ok(match self.token_backend {
            TokenBackend::File => TokenStorage::new(Box::new(FileStore::new(self.cache_dir()?))),
            TokenBackend::Keyring => TokenStorage::new(Box::new(KeyringStore::new())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.auto_refresh);
        assert_eq!(config.refresh_interval_ms, 100_000);
        assert_eq!(config.api_domain(), DEFAULT_API_DOMAIN);

        let options = config.session_options();
        assert_eq!(options.refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(options.refresh_lead, DEFAULT_REFRESH_LEAD);
        assert_eq!(options.decode_policy, DecodePolicy::FailOpen);
    }

    #[test]
    fn test_tiny_refresh_interval_is_clamped() {
        let config = Config {
            refresh_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.session_options().refresh_interval, MIN_REFRESH_DELAY);

        let config = Config {
            refresh_interval_ms: 30_000,
            ..Config::default()
        };
        assert_eq!(config.session_options().refresh_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"api_domain":"https://api.ocean.test","decode_policy":"fail_closed"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_domain(), "https://api.ocean.test");
        assert_eq!(config.decode_policy, DecodePolicy::FailClosed);
        assert!(config.auto_refresh);
        assert_eq!(config.token_backend, TokenBackend::File);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config {
            last_email: Some("jane@example.com".to_string()),
            token_backend: TokenBackend::Keyring,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.last_email.as_deref(), Some("jane@example.com"));
        assert_eq!(loaded.token_backend, TokenBackend::Keyring);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            API_DOMAIN_ENV => Some("https://env.ocean.test".to_string()),
            TOKEN_BACKEND_ENV => Some("Keychain".to_string()),
            _ => None,
        });
        assert_eq!(config.api_domain(), "https://env.ocean.test");
        assert_eq!(config.token_backend, TokenBackend::Keyring);

        // Blank and unknown values are ignored
        config.apply_env(|key| match key {
            API_DOMAIN_ENV => Some("  ".to_string()),
            TOKEN_BACKEND_ENV => Some("floppy".to_string()),
            _ => None,
        });
        assert_eq!(config.api_domain(), "https://env.ocean.test");
        assert_eq!(config.token_backend, TokenBackend::Keyring);
    }
}

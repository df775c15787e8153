//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, request timeout, token storage backend, last used
//! username and optional log directory.
//!
//! Configuration is stored at `~/.config/freshmarket/config.json`.
//! `FRESHMARKET_API_URL` and `FRESHMARKET_TOKEN_STORAGE` override the file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileTokenStore, KeyringTokenStore, TokenStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "freshmarket";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API root of a locally running marketplace server
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_API_URL: &str = "FRESHMARKET_API_URL";
const ENV_TOKEN_STORAGE: &str = "FRESHMARKET_TOKEN_STORAGE";

/// An environment override whose value was not understood
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub key: &'static str,
    pub value: String,
}

/// Where the credential pair is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
}

impl TokenStorage {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Some(TokenStorage::File),
            "keyring" | "keychain" => Some(TokenStorage::Keyring),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub token_storage: TokenStorage,
    pub last_username: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_storage: TokenStorage::default(),
            last_username: None,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load the config file, or defaults if absent.
    ///
    /// Environment overrides are applied separately with
    /// [`Config::apply_env_overrides`], so callers can install logging first
    /// and report overrides that were ignored.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Vec<IgnoredOverride> {
        self.apply_overrides(|key| std::env::var(key).ok())
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

    /// Apply overrides from a variable lookup. Returns the values that were
    /// not understood; the configured setting is kept for those.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<IgnoredOverride> {
        let mut ignored = Vec::new();
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(value) = lookup(ENV_TOKEN_STORAGE) {
            match TokenStorage::parse(&value) {
                Some(storage) => self.token_storage = storage,
                None => ignored.push(IgnoredOverride {
                    key: ENV_TOKEN_STORAGE,
                    value,
                }),
            }
        }
        ignored
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the token file and cart snapshot
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the configured token storage backend
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        Ok(match self.token_storage {
            TokenStorage::File => Arc::new(FileTokenStore::new(&self.data_dir()?)),
            TokenStorage::Keyring => Arc::new(KeyringTokenStore::new()),
        })
    }
}

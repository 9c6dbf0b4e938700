//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the service base URL, request timeout, which credential
//! backend to use, and the last identifier used to log in.
//!
//! Configuration is stored at `~/.config/tokenward/config.json`. The
//! `TOKENWARD_API_URL`, `TOKENWARD_TIMEOUT_SECS` and
//! `TOKENWARD_CREDENTIAL_BACKEND` environment variables override it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{HttpExecutor, DEFAULT_TIMEOUT_SECS};
use crate::auth::{CredentialStore, FileStore, KeyringStore, MemoryStore, SessionManager};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tokenward";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Service address used when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

const ENV_API_URL: &str = "TOKENWARD_API_URL";
const ENV_TIMEOUT_SECS: &str = "TOKENWARD_TIMEOUT_SECS";
const ENV_CREDENTIAL_BACKEND: &str = "TOKENWARD_CREDENTIAL_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    Memory,
    #[default]
    File,
    Keyring,
}

impl std::str::FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_identifier: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
            last_identifier: None,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::read_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Record the identifier of a successful login in the config file.
    ///
    /// Only that field changes: environment and command-line overrides held
    /// by a loaded `Config` are never written back.
    pub fn remember_identifier(identifier: &str) -> Result<()> {
        Self::remember_identifier_at(&Self::config_path()?, identifier)
    }

    fn remember_identifier_at(path: &Path, identifier: &str) -> Result<()> {
        let mut config = Self::read_from(path)?;
        config.last_identifier = Some(identifier.to_string());
        config.write_to(path)
    }

    fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay environment values. Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }
        if let Some(raw) = lookup(ENV_CREDENTIAL_BACKEND) {
            match raw.parse() {
                Ok(backend) => self.credential_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring invalid {}", ENV_CREDENTIAL_BACKEND),
            }
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

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Credential store for the configured backend
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        Ok(match self.credential_backend {
            CredentialBackend::Memory => Arc::new(MemoryStore::new()),
            CredentialBackend::File => Arc::new(FileStore::new(self.cache_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
        })
    }

    /// Session manager wired to the configured service and credential backend
    pub fn session_manager(&self) -> Result<SessionManager> {
        let executor = HttpExecutor::with_timeout(&self.api_base_url, self.request_timeout())
            .context("Failed to build HTTP client")?;
        Ok(SessionManager::new(self.credential_store()?, Arc::new(executor)))
    }
}

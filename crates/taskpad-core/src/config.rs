//! Application configuration management.
//!
//! Configuration is stored at `~/.config/taskpad/config.json` and can be
//! overridden by environment variables (a `.env` file is honoured by the
//! CLI). The API base URL is resolved in this order:
//!
//! 1. `TASKPAD_API_URL` / `api_url`
//! 2. the URL configured for the selected database backend
//! 3. the built-in default

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::SessionTiming;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "taskpad";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

pub const ENV_API_URL: &str = "TASKPAD_API_URL";
pub const ENV_DATABASE_TYPE: &str = "TASKPAD_DATABASE_TYPE";
pub const ENV_MONGODB_API_URL: &str = "TASKPAD_MONGODB_API_URL";
pub const ENV_POSTGRES_API_URL: &str = "TASKPAD_POSTGRES_API_URL";
pub const ENV_EMAIL: &str = "TASKPAD_EMAIL";

/// Which backend flavour the API is served from. Both speak the same
/// protocol; they differ only in their default URL and field naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Mongodb,
    Postgres,
}

impl DatabaseType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mongodb" | "mongo" => Some(DatabaseType::Mongodb),
            "postgres" | "postgresql" | "pg" => Some(DatabaseType::Postgres),
            _ => None,
        }
    }
}

/// Where the session token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

/// Session timing overrides, in config-friendly units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub warn_lead_secs: u64,
    pub logout_buffer_ms: u64,
    pub poll_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let timing = SessionTiming::default();
        Self {
            warn_lead_secs: timing.warn_lead.as_secs(),
            logout_buffer_ms: timing.logout_buffer.as_millis() as u64,
            poll_interval_secs: timing.poll_interval.as_secs(),
        }
    }
}

impl SessionSettings {
    pub fn timing(&self) -> SessionTiming {
        SessionTiming {
            warn_lead: Duration::from_secs(self.warn_lead_secs),
            logout_buffer: Duration::from_millis(self.logout_buffer_ms),
            // A zero interval would spin the poll loop
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub database: DatabaseType,
    pub mongodb_api_url: Option<String>,
    pub postgres_api_url: Option<String>,
    pub storage: StorageBackend,
    pub last_email: Option<String>,
    pub session: SessionSettings,
}

impl Config {
    /// Load the config file (defaults if missing) and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok());
        debug!(api_url = %config.api_url(), database = ?config.database, "Config loaded");
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
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

    /// Apply overrides from `lookup` (the process environment in practice).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_url = Some(url);
        }
        if let Some(db) = non_empty(ENV_DATABASE_TYPE).and_then(|v| DatabaseType::parse(&v)) {
            self.database = db;
        }
        if let Some(url) = non_empty(ENV_MONGODB_API_URL) {
            self.mongodb_api_url = Some(url);
        }
        if let Some(url) = non_empty(ENV_POSTGRES_API_URL) {
            self.postgres_api_url = Some(url);
        }
        if let Some(email) = non_empty(ENV_EMAIL) {
            self.last_email = Some(email);
        }
    }

    /// Base URL of the task API, without a trailing slash.
    pub fn api_url(&self) -> String {
        let backend_url = match self.database {
            DatabaseType::Mongodb => self.mongodb_api_url.as_deref(),
            DatabaseType::Postgres => self.postgres_api_url.as_deref(),
        };
        self.api_url
            .as_deref()
            .or(backend_url)
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string()
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
}

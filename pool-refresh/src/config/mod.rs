//! Application configuration
//!
//! Read from a TOML file (`--config PATH`, or `pool-refresh/config.toml`
//! under the platform config directory), falling back to defaults, then
//! overridden by `POOL_REFRESH_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::refresh::RefreshOptions;

const APP_DIR: &str = "pool-refresh";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub refresh: RefreshOptions,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection url, e.g. `sqlite://pool-refresh.db`
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// env_logger filter, e.g. `info` or `pool_refresh=debug`
    pub filter: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let url = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("pool-refresh.db"))
            .map(|path| format!("sqlite://{}", path.display()))
            .unwrap_or_else(|| "sqlite://pool-refresh.db".to_string());

        Self {
            url,
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Read the file at `path`, or the default path; defaults when the
    /// default file does not exist. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Apply `POOL_REFRESH_*` overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("POOL_REFRESH_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(value) = lookup("POOL_REFRESH_MAX_CONNECTIONS") {
            self.database.max_connections = value
                .parse()
                .with_context(|| format!("POOL_REFRESH_MAX_CONNECTIONS is not a number: {}", value))?;
        }
        if let Some(filter) = lookup("POOL_REFRESH_LOG") {
            self.logging.filter = filter;
        }
        if let Some(value) = lookup("POOL_REFRESH_EMIT_EVENTS") {
            self.refresh.emit_events = parse_flag("POOL_REFRESH_EMIT_EVENTS", &value)?;
        }
        if let Some(value) = lookup("POOL_REFRESH_FAIL_ON_INTEGRITY_ISSUES") {
            self.refresh.fail_on_integrity_issues =
                parse_flag("POOL_REFRESH_FAIL_ON_INTEGRITY_ISSUES", &value)?;
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be a boolean, got '{}'", key, value),
    }
}

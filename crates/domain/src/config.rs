//! Environment-driven configuration plus the JSON plugin manifest.

use std::{env, fs, path::Path, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_EXPLORER_URL: &str = "https://api.ergoplatform.com";
pub const DEFAULT_PLUGINS_FILE: &str = "plugins.json";

/// Endpoints and file locations every binary needs before anything else can
/// be wired up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    node_url: String,
    explorer_url: String,
    plugins_file: String,
    http_timeout: Duration,
}

impl BootstrapConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            node_url: get_required_var("LEDGERWATCH_NODE_URL")?,
            explorer_url: get_optional_var("LEDGERWATCH_EXPLORER_URL")
                .unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string()),
            plugins_file: get_optional_var("LEDGERWATCH_PLUGINS_FILE")
                .unwrap_or_else(|| DEFAULT_PLUGINS_FILE.to_string()),
            http_timeout: Duration::from_millis(get_number_or(
                "LEDGERWATCH_HTTP_TIMEOUT_MS",
                10_000,
            )?),
        })
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    pub fn explorer_url(&self) -> &str {
        &self.explorer_url
    }

    pub fn plugins_file(&self) -> &str {
        &self.plugins_file
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }
}

/// Poll loop knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    /// A pending entry absent for more than this many consecutive ticks is
    /// reported as dropped.
    pub max_missing_polls: u32,
    pub page_size: usize,
}

impl MonitorSettings {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
    pub const DEFAULT_MAX_MISSING_POLLS: u32 = 10;
    pub const DEFAULT_PAGE_SIZE: usize = 1_000;

    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let poll_interval_ms = get_number_or(
            "MONITOR_POLL_INTERVAL_MS",
            Self::DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )?;
        let max_missing_polls =
            get_number_or("MONITOR_MAX_MISSING_POLLS", Self::DEFAULT_MAX_MISSING_POLLS as u64)?;
        let page_size = get_number_or("MONITOR_PAGE_SIZE", Self::DEFAULT_PAGE_SIZE as u64)?;

        Ok(Self {
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            max_missing_polls: u32::try_from(max_missing_polls).unwrap_or(u32::MAX),
            page_size: usize::try_from(page_size).unwrap_or(usize::MAX).max(1),
        })
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_missing_polls: Self::DEFAULT_MAX_MISSING_POLLS,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

/// One entry of the plugin manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginEntry {
    pub id: String,
    pub enabled: bool,
    #[serde(default = "empty_object")]
    pub config: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Reads and parses the plugin manifest at `path`.
pub fn load_plugin_manifest(path: impl AsRef<Path>) -> Result<Vec<PluginEntry>, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ManifestIo {
        path: path.display().to_string(),
        source,
    })?;
    parse_plugin_manifest(&raw)
}

pub fn parse_plugin_manifest(raw: &str) -> Result<Vec<PluginEntry>, ConfigError> {
    let entries: Vec<PluginEntry> = serde_json::from_str(raw)?;
    if entries.is_empty() {
        return Err(ConfigError::EmptyManifest);
    }
    Ok(entries)
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match get_optional_var(key) {
        Some(value) => value
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("LEDGERWATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration, environment parsing or manifest
/// loading fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
    #[error("failed to read plugin manifest `{path}`: {source}")]
    ManifestIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid plugin manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),
    #[error("plugin manifest must list at least one plugin")]
    EmptyManifest,
}

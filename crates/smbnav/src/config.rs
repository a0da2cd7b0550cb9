//! Configuration management for smbnav.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/smbnav/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::{DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_LIMIT, MAX_CHUNK_SIZE};
use crate::shares::DEFAULT_CANDIDATE_SHARES;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be nonzero")]
    InvalidPort,

    #[error("timeout_secs must be between 1 and 3600 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("page_limit must be between 1 and 1000000, got {0}")]
    InvalidPageLimit(usize),

    #[error("chunk_size must be between 1 and 1048576, got {0}")]
    InvalidChunkSize(usize),

    #[error("candidate_shares must not contain empty names")]
    EmptyCandidateShare,

    #[error("log level must be one of: trace, debug, info, warn, error, or a filter directive; got {0}")]
    InvalidLogLevel(String),

    #[error("loopback share {0} is marked read-only but not defined")]
    UnknownReadOnlyShare(String),

    #[error("loopback share names must be nonempty and must not end in '$', got {0:?}")]
    InvalidShareName(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest accepted page limit.
const MAX_PAGE_LIMIT: usize = 1_000_000;

/// Main configuration structure for smbnav.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Server connection defaults.
    pub connection: ConnectionConfig,

    /// Directory listing settings.
    pub browse: BrowseConfig,

    /// Share discovery settings.
    pub discovery: DiscoveryConfig,

    /// File transfer settings.
    pub transfer: TransferConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Local directories served by the loopback backend.
    pub loopback: LoopbackConfig,
}

/// Server connection defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// TCP port of the server.
    pub port: u16,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Domain used when the command line gives none.
    pub domain: String,
}

/// Directory listing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowseConfig {
    /// Maximum entries per listing.
    pub page_limit: usize,
}

/// Share discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Share names probed, in order, when enumeration is unavailable.
    pub candidate_shares: Vec<String>,
}

/// File transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes requested per read.
    pub chunk_size: usize,

    /// Where downloads land when no local path is given.
    pub download_dir: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level (trace, debug, info, warn, error) or an `EnvFilter` directive.
    pub level: String,

    /// Also write logs to this file (rotated daily).
    pub file: Option<PathBuf>,
}

/// Local directories served by the loopback backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Share name to local directory.
    pub shares: BTreeMap<String, PathBuf>,

    /// Shares that reject writes.
    pub read_only: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: 139,
            timeout_secs: 30,
            domain: String::new(),
        }
    }
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            candidate_shares: DEFAULT_CANDIDATE_SHARES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_dir: default_download_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smbnav")
        .join("config.toml")
}

/// Returns the default download directory.
fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn is_valid_log_level(level: &str) -> bool {
    if level.contains('=') || level.contains(',') {
        tracing_subscriber::EnvFilter::try_new(level).is_ok()
    } else {
        VALID_LOG_LEVELS.contains(&level.to_lowercase().as_str())
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SMBNAV_LOG_LEVEL: Override log level or filter directive
    /// - SMBNAV_TIMEOUT: Override the request timeout in seconds
    /// - SMBNAV_PAGE_LIMIT: Override the listing page limit
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SMBNAV_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }

        if let Ok(value) = std::env::var("SMBNAV_TIMEOUT") {
            match value.trim().parse::<u64>() {
                Ok(secs) => {
                    tracing::info!("Overriding timeout_secs from environment: {}", secs);
                    self.connection.timeout_secs = secs;
                }
                Err(_) if value.is_empty() => {}
                Err(e) => tracing::warn!("Ignoring SMBNAV_TIMEOUT={:?}: {}", value, e),
            }
        }

        if let Ok(value) = std::env::var("SMBNAV_PAGE_LIMIT") {
            match value.trim().parse::<usize>() {
                Ok(limit) => {
                    tracing::info!("Overriding page_limit from environment: {}", limit);
                    self.browse.page_limit = limit;
                }
                Err(_) if value.is_empty() => {}
                Err(e) => tracing::warn!("Ignoring SMBNAV_PAGE_LIMIT={:?}: {}", value, e),
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        // Validate timeout_secs: 1-3600
        if !(1..=3600).contains(&self.connection.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.connection.timeout_secs));
        }

        if !(1..=MAX_PAGE_LIMIT).contains(&self.browse.page_limit) {
            return Err(ConfigError::InvalidPageLimit(self.browse.page_limit));
        }

        if !(1..=MAX_CHUNK_SIZE).contains(&self.transfer.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.transfer.chunk_size));
        }

        if self
            .discovery
            .candidate_shares
            .iter()
            .any(|s| s.trim().is_empty())
        {
            return Err(ConfigError::EmptyCandidateShare);
        }

        if !is_valid_log_level(&self.logging.level) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        if let Some(name) = self
            .loopback
            .shares
            .keys()
            .find(|name| name.trim().is_empty() || name.ends_with('$'))
        {
            return Err(ConfigError::InvalidShareName(name.clone()));
        }

        if let Some(name) = self
            .loopback
            .read_only
            .iter()
            .find(|name| !self.loopback.shares.contains_key(*name))
        {
            return Err(ConfigError::UnknownReadOnlyShare(name.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

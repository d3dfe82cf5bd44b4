//! Application Configuration
//!
//! Manages all ldfleet settings including:
//! - Console tool location and per-command timeout
//! - Polling intervals and optional deadlines
//! - Creation behaviour
//! - HTTP server binding

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug};

use crate::error::{LdError, Result};

/// ldconsole configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Path to ldconsole, or a bare name resolved through PATH
    pub program: PathBuf,
    /// Kill a single console command after this many seconds (unset waits forever)
    pub command_timeout_secs: Option<u64>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ldconsole"),
            command_timeout_secs: None,
        }
    }
}

impl ConsoleConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between android-ready checks
    pub ready_interval_ms: u64,
    /// Give up waiting for android-ready after this many seconds (unset waits forever)
    pub ready_timeout_secs: Option<u64>,
    /// Interval between running checks while quitting
    pub quit_interval_ms: u64,
    /// Give up waiting for quit after this many seconds (unset waits forever)
    pub quit_timeout_secs: Option<u64>,
    /// Attempts for a listing that succeeds with no rows
    pub empty_list_attempts: u32,
    /// Interval between those attempts
    pub empty_list_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            ready_interval_ms: 10_000,
            ready_timeout_secs: None,
            quit_interval_ms: 5_000,
            quit_timeout_secs: None,
            empty_list_attempts: 5,
            empty_list_interval_ms: 1_000,
        }
    }
}

impl PollingConfig {
    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }

    pub fn quit_interval(&self) -> Duration {
        Duration::from_millis(self.quit_interval_ms)
    }

    pub fn quit_timeout(&self) -> Option<Duration> {
        self.quit_timeout_secs.map(Duration::from_secs)
    }

    pub fn empty_list_interval(&self) -> Duration {
        Duration::from_millis(self.empty_list_interval_ms)
    }
}

/// Creation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationConfig {
    /// Check the index returned by `copy` against a fresh listing, falling
    /// back to a before/after diff when it is missing
    pub verify_copied_index: bool,
}

impl Default for CreationConfig {
    fn default() -> Self {
        Self {
            verify_copied_index: true,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub console: ConsoleConfig,
    pub polling: PollingConfig,
    pub creation: CreationConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "ldfleet", "ldfleet")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the platform config directory, defaults if absent
    pub async fn load() -> Result<Self> {
        match Self::config_file() {
            Some(config_file) if config_file.exists() => Self::load_from(&config_file).await,
            _ => {
                info!("Config file not found, using defaults");
                Ok(AppConfig::default())
            }
        }
    }

    /// Load configuration from an explicit file
    pub async fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Reject values that would make polling spin or never start
    pub fn validate(&self) -> Result<()> {
        if self.polling.ready_interval_ms == 0 || self.polling.quit_interval_ms == 0 {
            return Err(LdError::Config("polling intervals must be greater than zero".into()));
        }
        if self.polling.empty_list_attempts == 0 {
            return Err(LdError::Config("empty_list_attempts must be at least 1".into()));
        }
        if self.console.program.as_os_str().is_empty() {
            return Err(LdError::Config("console.program must not be empty".into()));
        }
        Ok(())
    }
}

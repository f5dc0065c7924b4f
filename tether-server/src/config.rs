//! Server configuration.
//!
//! Layout of the data directory (`$TETHER_DIR`, default `~/.tether`):
//! ```text
//! ~/.tether/
//! ├── config.toml       # Optional overrides (every field defaulted)
//! ├── tether.db         # Mapping store
//! └── run/
//!     └── server.pid    # PID file
//! ```
//!
//! Precedence: environment (`TETHER_BIND`, `TETHER_BRIDGE_URL`) over
//! `config.toml` over defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tether_core::LifecycleConfig;

/// How the daemon reaches the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// Platform bridge over HTTP.
    #[default]
    Http,
    /// In-process platform model; nothing leaves the daemon.
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub mode: GatewayMode,

    /// Base URL of the platform bridge
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::default(),
            bridge_url: default_bridge_url(),
        }
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    bind: Option<String>,
    database_path: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    log_format: LogFormat,
    gateway: GatewayConfig,
    lifecycle: LifecycleConfig,
}

fn default_bind() -> String {
    "127.0.0.1:7420".to_string()
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:7410".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tether")
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to configuration file
    pub config_path: PathBuf,
    /// Address the HTTP API listens on
    pub bind: String,
    /// Mapping store path
    pub database_path: PathBuf,
    /// PID file path
    pub pid_file: PathBuf,
    pub log_format: LogFormat,
    pub gateway: GatewayConfig,
    pub lifecycle: LifecycleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir(&default_data_dir(), FileConfig::default())
    }
}

impl Config {
    fn with_data_dir(data_dir: &Path, file: FileConfig) -> Self {
        Self {
            config_path: data_dir.join("config.toml"),
            bind: file.bind.unwrap_or_else(default_bind),
            database_path: file
                .database_path
                .unwrap_or_else(|| data_dir.join("tether.db")),
            pid_file: file
                .pid_file
                .unwrap_or_else(|| data_dir.join("run").join("server.pid")),
            log_format: file.log_format,
            gateway: file.gateway,
            lifecycle: file.lifecycle,
        }
    }

    /// Load configuration from `$TETHER_DIR` (or `~/.tether`) and the
    /// environment.
    pub fn load() -> anyhow::Result<Self> {
        let data_dir = std::env::var("TETHER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let mut config = Self::load_from(&data_dir)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration rooted at `data_dir`, creating directories.
    pub fn load_from(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir.join("run"))
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;

        let config_path = data_dir.join("config.toml");
        let file = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            FileConfig::default()
        };

        let config = Self::with_data_dir(data_dir, file);
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = config.pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("TETHER_BIND") {
            self.bind = bind;
        }
        if let Some(url) = lookup("TETHER_BRIDGE_URL") {
            self.gateway.bridge_url = url;
        }
    }
}

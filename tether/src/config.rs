//! Configuration for the tether CLI.
//!
//! Sources, highest precedence first:
//! 1. Command-line flags (`--database`, `--server`) and their env fallbacks
//! 2. `TETHER_DIR` (data directory, default `~/.tether`)
//! 3. Default values

use std::path::PathBuf;

use crate::cli::Cli;

fn default_data_dir() -> PathBuf {
    std::env::var("TETHER_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".tether")
        })
}

fn default_server_url() -> String {
    "http://127.0.0.1:7420".to_string()
}

/// Resolved CLI settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Mapping store path
    pub database_path: PathBuf,
    /// Daemon base URL, without trailing slash
    pub server_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join("tether.db"),
            server_url: default_server_url(),
        }
    }
}

impl Config {
    /// Resolve settings from parsed arguments.
    pub fn from_cli(cli: &Cli) -> Self {
        let defaults = Self::default();
        Self {
            database_path: cli.database.clone().unwrap_or(defaults.database_path),
            server_url: cli
                .server
                .clone()
                .unwrap_or(defaults.server_url)
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

//! Command implementations for the tether CLI.
//!
//! Registry and inspection commands read the mapping store directly;
//! sweeps and reclaims go through the daemon so they serialize with
//! live notifications.

pub mod daemon;
pub mod mappings;
pub mod status;
pub mod templates;

use anyhow::{Context, Result};
use tether_core::SqliteMappingStore;

use crate::config::Config;

/// Open the mapping store, creating its directory on first use.
pub(crate) fn open_store(config: &Config) -> Result<SqliteMappingStore> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    SqliteMappingStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open mapping store at {}",
            config.database_path.display()
        )
    })
}

/// Format a unix timestamp in milliseconds for display.
pub(crate) fn format_time(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts_ms.to_string())
}

#[cfg(test)]
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    Config {
        database_path: dir.join("nested").join("tether.db"),
        server_url: "http://127.0.0.1:9".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::MappingStore;

    #[test]
    fn test_open_store_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());

        let store = open_store(&config).unwrap();
        assert!(config.database_path.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_time(90_000), "1970-01-01 00:01:30 UTC");
    }
}

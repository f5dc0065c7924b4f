//! Lifecycle configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the lifecycle manager and sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound for any single gateway call, in milliseconds (default: 10000)
    pub adapter_timeout_ms: u64,

    /// Interval between sweeper passes, in seconds (default: 60)
    pub sweep_interval_secs: u64,

    /// Category that duplicate voice rooms are placed in. Falls back to the
    /// template's own group when unset.
    pub voice_parent_group: Option<String>,

    /// Channel that event threads are created under.
    pub thread_parent_group: Option<String>,

    /// Reason passed to the platform when a companion is locked.
    pub lock_reason: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_ms: 10_000,
            sweep_interval_secs: 60,
            voice_parent_group: None,
            thread_parent_group: None,
            lock_reason: "Event has ended".to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.adapter_timeout(), Duration::from_secs(10));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.lock_reason, "Event has ended");
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: LifecycleConfig =
            serde_json::from_str(r#"{"sweep_interval_secs": 15}"#).unwrap();
        assert_eq!(config.sweep_interval_secs, 15);
        assert_eq!(config.adapter_timeout_ms, 10_000);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let config = LifecycleConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}

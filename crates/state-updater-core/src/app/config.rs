//! State updater configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// State updater configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdaterConfig {
    /// Name of the worker thread (also used as the log span name)
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Shutdown timeout used when the updater is dropped
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_thread_name() -> String {
    "state-updater".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for StateUpdaterConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl StateUpdaterConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get the shutdown timeout as a Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StateUpdaterConfig::default();
        assert_eq!(config.thread_name, "state-updater");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StateUpdaterConfig::from_json_str(r#"{"thread_name": "restorer-1"}"#).unwrap();
        assert_eq!(config.thread_name, "restorer-1");
        assert_eq!(config.shutdown_timeout_ms, 30_000);

        let config = StateUpdaterConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StateUpdaterConfig::default());
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(StateUpdaterConfig::from_json_str(r#"{"shutdown_timeout_ms": "soon"}"#).is_err());
    }
}

//! Coordinator runtime configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Environment;

/// Tunables for the coordinator and its bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorConfig {
    /// Per-topic broadcast channel capacity
    pub bus_capacity: usize,

    /// Command channel buffer between handles and the coordinator task
    pub channel_buffer: usize,

    /// RPC request timeout (in milliseconds)
    pub request_timeout_ms: u64,

    /// Timeout for the default-profiles provider during bootstrap (in milliseconds)
    pub bootstrap_timeout_ms: u64,

    /// Environment assumed when no persisted state exists
    pub default_environment: Environment,

    /// Version stamped into freshly created state documents
    pub state_version: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            channel_buffer: 256,
            request_timeout_ms: 5_000,
            bootstrap_timeout_ms: 5_000,
            default_environment: Environment::Space,
            state_version: "1.0.0".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.bus_capacity, 256);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_environment, Environment::Space);
    }

    #[test]
    fn test_sparse_document_fills_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"requestTimeoutMs": 100}"#).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_millis(100));
        assert_eq!(config.channel_buffer, 256);
        assert_eq!(config.state_version, "1.0.0");
    }
}

//! Coordinator-owned state and the late-join snapshot

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::profile::{BindsetSelector, Environment, Profile, VirtualProfile};

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Document metadata, flattened into the persisted state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for StateMetadata {
    fn default() -> Self {
        Self {
            last_modified: Utc::now(),
            version: default_version(),
        }
    }
}

fn default_environment() -> Environment {
    Environment::Space
}

/// The single source of truth
///
/// Created once at coordinator construction, hydrated from storage, and
/// mutated only by the coordinator's own operation handlers. Serializes to
/// the flat persisted document shape
/// `{currentProfile, currentEnvironment, profiles, settings, lastModified, version}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub current_profile: Option<String>,
    #[serde(default = "default_environment")]
    pub current_environment: Environment,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(flatten)]
    pub metadata: StateMetadata,
}

impl AppState {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            current_profile: None,
            current_environment: Environment::Space,
            profiles: BTreeMap::new(),
            settings: Map::new(),
            metadata: StateMetadata {
                last_modified: Utc::now(),
                version: version.into(),
            },
        }
    }

    /// Bump the modification timestamp; every successful mutation does this
    pub fn touch(&mut self) {
        self.metadata.last_modified = Utc::now();
    }
}

/// Full snapshot handed to late-joining subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub current_profile: Option<String>,
    pub current_environment: Environment,
    pub profiles: BTreeMap<String, Profile>,
    pub settings: Map<String, Value>,
    pub metadata: StateMetadata,
    pub active_bindset: BindsetSelector,
    /// Pre-materialized projection of the current profile, so a new
    /// subscriber needs no follow-up query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_profile: Option<VirtualProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_serializes_flat() {
        let state = AppState::new("1.0.0");
        let doc = serde_json::to_value(&state).unwrap();

        assert_eq!(doc["version"], "1.0.0");
        assert!(doc["lastModified"].is_string());
        assert!(doc.get("metadata").is_none());
        assert_eq!(doc["currentEnvironment"], "space");
    }

    #[test]
    fn test_state_hydrates_from_sparse_document() {
        let state: AppState = serde_json::from_value(json!({
            "profiles": {}
        }))
        .unwrap();

        assert!(state.current_profile.is_none());
        assert_eq!(state.current_environment, Environment::Space);
        assert_eq!(state.metadata.version, "1.0.0");
    }

    #[test]
    fn test_touch_advances_last_modified() {
        let mut state = AppState::new("1.0.0");
        let before = state.metadata.last_modified;
        std::thread::sleep(std::time::Duration::from_millis(2));
        state.touch();
        assert!(state.metadata.last_modified > before);
    }
}

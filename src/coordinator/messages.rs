//! Coordinator messages
//!
//! Commands and replies for the actor pattern, plus the typed payloads
//! crossing the RPC surface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{
    BindsetSelector, Environment, Profile, ProfileUpdates, StateSnapshot, VirtualProfile,
};

/// Request topics served by the coordinator
pub mod topics {
    pub const GET_CURRENT_STATE: &str = "data:get-current-state";
    pub const SWITCH_PROFILE: &str = "data:switch-profile";
    pub const CREATE_PROFILE: &str = "data:create-profile";
    pub const CLONE_PROFILE: &str = "data:clone-profile";
    pub const RENAME_PROFILE: &str = "data:rename-profile";
    pub const DELETE_PROFILE: &str = "data:delete-profile";
    pub const UPDATE_PROFILE: &str = "data:update-profile";
    pub const SET_ENVIRONMENT: &str = "data:set-environment";
    pub const SET_ACTIVE_BINDSET: &str = "data:set-active-bindset";
    pub const GET_KEYS: &str = "data:get-keys";
    pub const GET_KEY_COMMANDS: &str = "data:get-key-commands";
    pub const GET_SETTINGS: &str = "data:get-settings";
    pub const UPDATE_SETTINGS: &str = "data:update-settings";
    pub const RELOAD_STATE: &str = "data:reload-state";

    /// Served by an external data provider, queried during bootstrap
    pub const DEFAULT_PROFILES: &str = "data:default-profiles";
}

/// Errors from coordinator operations
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("Profile {0} not found")]
    ProfileNotFound(String),

    #[error("Profile name is required")]
    NameRequired,

    #[error("Profile {0} already exists")]
    ProfileExists(String),

    #[error("Cannot delete the last profile")]
    LastProfile,

    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("Bindset {0} not found")]
    BindsetNotFound(String),

    #[error("Key {0} not found")]
    KeyNotFound(String),

    #[error("Profile updates are required")]
    UpdatesRequired,

    #[error("No current profile")]
    NoCurrentProfile,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Channel error")]
    ChannelClosed,
}

pub type CoordResult<T> = Result<T, CoordError>;

/// Commands sent to the coordinator actor
#[derive(Debug)]
pub enum CoordCommand {
    LoadInitialState {
        reply: oneshot::Sender<CoordResult<StateSnapshot>>,
    },
    GetCurrentState {
        reply: oneshot::Sender<CoordResult<StateSnapshot>>,
    },
    SwitchProfile {
        profile_id: String,
        reply: oneshot::Sender<CoordResult<SwitchProfileResult>>,
    },
    CreateProfile {
        name: String,
        description: Option<String>,
        mode: Option<Environment>,
        reply: oneshot::Sender<CoordResult<CreateProfileResult>>,
    },
    CloneProfile {
        source_id: String,
        new_name: String,
        reply: oneshot::Sender<CoordResult<CloneProfileResult>>,
    },
    RenameProfile {
        profile_id: String,
        new_name: String,
        description: Option<String>,
        reply: oneshot::Sender<CoordResult<RenameProfileResult>>,
    },
    DeleteProfile {
        profile_id: String,
        reply: oneshot::Sender<CoordResult<DeleteProfileResult>>,
    },
    UpdateProfile {
        profile_id: String,
        updates: ProfileUpdates,
        reply: oneshot::Sender<CoordResult<UpdateProfileResult>>,
    },
    SetEnvironment {
        environment: Environment,
        reply: oneshot::Sender<CoordResult<SetEnvironmentResult>>,
    },
    SetActiveBindset {
        bindset: BindsetSelector,
        reply: oneshot::Sender<CoordResult<SetActiveBindsetResult>>,
    },
    GetKeys {
        environment: Environment,
        reply: oneshot::Sender<CoordResult<GetKeysResult>>,
    },
    GetKeyCommands {
        environment: Environment,
        key: String,
        reply: oneshot::Sender<CoordResult<GetKeyCommandsResult>>,
    },
    GetSettings {
        reply: oneshot::Sender<CoordResult<SettingsResult>>,
    },
    UpdateSettings {
        settings: Map<String, Value>,
        reply: oneshot::Sender<CoordResult<SettingsResult>>,
    },
    ReloadState {
        reply: oneshot::Sender<CoordResult<StateSnapshot>>,
    },
    Shutdown,
}

// === RPC payloads ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchProfilePayload {
    pub profile_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfilePayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneProfilePayload {
    pub source_id: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameProfilePayload {
    pub profile_id: String,
    pub new_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProfilePayload {
    pub profile_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfilePayload {
    pub profile_id: String,
    pub updates: ProfileUpdates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEnvironmentPayload {
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveBindsetPayload {
    pub bindset: BindsetSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKeysPayload {
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKeyCommandsPayload {
    pub environment: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsPayload {
    pub settings: Map<String, Value>,
}

// === RPC results ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchProfileResult {
    pub success: bool,
    /// False when the requested profile was already current
    pub switched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<VirtualProfile>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileResult {
    pub success: bool,
    pub profile_id: String,
    pub profile: Profile,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneProfileResult {
    pub success: bool,
    pub profile_id: String,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameProfileResult {
    pub success: bool,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProfileResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switched_profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileResult {
    pub success: bool,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEnvironmentResult {
    pub success: bool,
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveBindsetResult {
    pub success: bool,
    pub bindset: BindsetSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKeysResult {
    pub environment: Environment,
    pub keys: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKeyCommandsResult {
    pub environment: Environment,
    pub key: String,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResult {
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadStateResult {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CoordError::ProfileNotFound("alpha".into()).to_string(),
            "Profile alpha not found"
        );
        assert_eq!(
            CoordError::NameRequired.to_string(),
            "Profile name is required"
        );
        assert_eq!(
            CoordError::LastProfile.to_string(),
            "Cannot delete the last profile"
        );
        assert_eq!(
            CoordError::InvalidEnvironment("orbit".into()).to_string(),
            "Invalid environment: orbit"
        );
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload: UpdateProfilePayload = serde_json::from_value(serde_json::json!({
            "profileId": "alpha",
            "updates": { "add": { "aliases": { "fire": { "commands": "FireAll" } } } }
        }))
        .unwrap();
        assert_eq!(payload.profile_id, "alpha");
        assert!(!payload.updates.is_empty());
    }

    #[test]
    fn test_delete_result_omits_absent_switch() {
        let result = DeleteProfileResult {
            success: true,
            switched_profile: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("switchedProfile").is_none());
    }
}

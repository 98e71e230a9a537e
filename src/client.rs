//! Typed RPC client for bus-attached collaborators
//!
//! UI panels and other subscribers talk to the coordinator through this
//! wrapper instead of hand-rolling request envelopes. Errors arrive as
//! [`RpcError::Handler`] carrying the coordinator's message verbatim.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;

use crate::bus::Bus;
use crate::coordinator::messages::{
    topics, CloneProfilePayload, CloneProfileResult, CreateProfilePayload, CreateProfileResult,
    DeleteProfilePayload, DeleteProfileResult, GetKeyCommandsPayload, GetKeyCommandsResult,
    GetKeysPayload, GetKeysResult, ReloadStateResult, RenameProfilePayload, RenameProfileResult,
    SetActiveBindsetPayload, SetActiveBindsetResult, SetEnvironmentPayload, SetEnvironmentResult,
    SettingsResult, SwitchProfilePayload, SwitchProfileResult, UpdateProfilePayload,
    UpdateProfileResult, UpdateSettingsPayload,
};
use crate::domain::{BindsetSelector, Environment, ProfileUpdates, StateSnapshot};
use crate::rpc::{self, RpcError, DEFAULT_REQUEST_TIMEOUT};

/// Typed client over the coordinator's RPC surface
#[derive(Clone)]
pub struct CoordinatorClient {
    bus: Arc<Bus>,
    timeout: Duration,
}

impl CoordinatorClient {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self {
            bus,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(bus: Arc<Bus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    /// Subscribe to a broadcast topic (see [`crate::events::topics`])
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        self.bus.subscribe(topic)
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        topic: &str,
        payload: &P,
    ) -> Result<R, RpcError> {
        let payload = serde_json::to_value(payload).map_err(|e| RpcError::Payload(e.to_string()))?;
        let reply = rpc::request(&self.bus, topic, payload, self.timeout).await?;
        serde_json::from_value(reply).map_err(|e| RpcError::Payload(e.to_string()))
    }

    /// Late-join entry point: the full current snapshot
    pub async fn get_current_state(&self) -> Result<StateSnapshot, RpcError> {
        let reply = rpc::request(&self.bus, topics::GET_CURRENT_STATE, json!({}), self.timeout).await?;
        serde_json::from_value(reply).map_err(|e| RpcError::Payload(e.to_string()))
    }

    pub async fn switch_profile(&self, profile_id: &str) -> Result<SwitchProfileResult, RpcError> {
        self.call(
            topics::SWITCH_PROFILE,
            &SwitchProfilePayload {
                profile_id: profile_id.to_string(),
            },
        )
        .await
    }

    pub async fn create_profile(
        &self,
        name: &str,
        description: Option<String>,
        mode: Option<Environment>,
    ) -> Result<CreateProfileResult, RpcError> {
        self.call(
            topics::CREATE_PROFILE,
            &CreateProfilePayload {
                name: name.to_string(),
                description,
                mode: mode.map(|m| m.as_str().to_string()),
            },
        )
        .await
    }

    pub async fn clone_profile(
        &self,
        source_id: &str,
        new_name: &str,
    ) -> Result<CloneProfileResult, RpcError> {
        self.call(
            topics::CLONE_PROFILE,
            &CloneProfilePayload {
                source_id: source_id.to_string(),
                new_name: new_name.to_string(),
            },
        )
        .await
    }

    pub async fn rename_profile(
        &self,
        profile_id: &str,
        new_name: &str,
        description: Option<String>,
    ) -> Result<RenameProfileResult, RpcError> {
        self.call(
            topics::RENAME_PROFILE,
            &RenameProfilePayload {
                profile_id: profile_id.to_string(),
                new_name: new_name.to_string(),
                description,
            },
        )
        .await
    }

    pub async fn delete_profile(&self, profile_id: &str) -> Result<DeleteProfileResult, RpcError> {
        self.call(
            topics::DELETE_PROFILE,
            &DeleteProfilePayload {
                profile_id: profile_id.to_string(),
            },
        )
        .await
    }

    pub async fn update_profile(
        &self,
        profile_id: &str,
        updates: ProfileUpdates,
    ) -> Result<UpdateProfileResult, RpcError> {
        self.call(
            topics::UPDATE_PROFILE,
            &UpdateProfilePayload {
                profile_id: profile_id.to_string(),
                updates,
            },
        )
        .await
    }

    pub async fn set_environment(&self, environment: Environment) -> Result<SetEnvironmentResult, RpcError> {
        self.call(
            topics::SET_ENVIRONMENT,
            &SetEnvironmentPayload {
                environment: environment.as_str().to_string(),
            },
        )
        .await
    }

    pub async fn set_active_bindset(
        &self,
        bindset: BindsetSelector,
    ) -> Result<SetActiveBindsetResult, RpcError> {
        self.call(topics::SET_ACTIVE_BINDSET, &SetActiveBindsetPayload { bindset })
            .await
    }

    pub async fn get_keys(&self, environment: Environment) -> Result<GetKeysResult, RpcError> {
        self.call(
            topics::GET_KEYS,
            &GetKeysPayload {
                environment: environment.as_str().to_string(),
            },
        )
        .await
    }

    pub async fn get_key_commands(
        &self,
        environment: Environment,
        key: &str,
    ) -> Result<GetKeyCommandsResult, RpcError> {
        self.call(
            topics::GET_KEY_COMMANDS,
            &GetKeyCommandsPayload {
                environment: environment.as_str().to_string(),
                key: key.to_string(),
            },
        )
        .await
    }

    pub async fn get_settings(&self) -> Result<SettingsResult, RpcError> {
        let reply = rpc::request(&self.bus, topics::GET_SETTINGS, json!({}), self.timeout).await?;
        serde_json::from_value(reply).map_err(|e| RpcError::Payload(e.to_string()))
    }

    pub async fn update_settings(
        &self,
        settings: Map<String, Value>,
    ) -> Result<SettingsResult, RpcError> {
        self.call(topics::UPDATE_SETTINGS, &UpdateSettingsPayload { settings })
            .await
    }

    pub async fn reload_state(&self) -> Result<ReloadStateResult, RpcError> {
        let reply = rpc::request(&self.bus, topics::RELOAD_STATE, json!({}), self.timeout).await?;
        serde_json::from_value(reply).map_err(|e| RpcError::Payload(e.to_string()))
    }
}

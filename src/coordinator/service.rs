//! RPC surface: bridges bus requests to the coordinator handle
//!
//! One responder per topic. Domain errors cross the boundary as handler
//! error strings, unchanged; raw environment names are validated here.

use std::sync::Arc;

use eyre::{Result, eyre};
use serde_json::Value;
use tracing::info;

use crate::bus::Bus;
use crate::domain::Environment;
use crate::rpc::{self, RespondHandle};

use super::handle::CoordinatorHandle;
use super::messages::{
    topics, CloneProfilePayload, CreateProfilePayload, DeleteProfilePayload, GetKeyCommandsPayload,
    GetKeysPayload, ReloadStateResult, RenameProfilePayload, SetActiveBindsetPayload,
    SetEnvironmentPayload, SwitchProfilePayload, UpdateProfilePayload, UpdateSettingsPayload,
};

/// The registered responders, one per topic
pub struct RpcSurface {
    handles: Vec<RespondHandle>,
}

impl RpcSurface {
    /// Unregister every responder
    pub fn detach(self) {
        for handle in self.handles {
            handle.detach();
        }
    }
}

fn parse_environment(raw: &str) -> Result<Environment> {
    Environment::parse(raw).ok_or_else(|| eyre!("Invalid environment: {raw}"))
}

fn encode<T: serde::Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Register a responder for every coordinator topic
pub fn register(bus: &Arc<Bus>, handle: &CoordinatorHandle) -> RpcSurface {
    let mut handles = Vec::new();

    handles.push(rpc::respond(bus, topics::GET_CURRENT_STATE, {
        let handle = handle.clone();
        move |_payload| {
            let handle = handle.clone();
            async move { encode(handle.get_current_state().await?) }
        }
    }));

    handles.push(rpc::respond(bus, topics::SWITCH_PROFILE, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: SwitchProfilePayload = serde_json::from_value(payload)?;
                encode(handle.switch_profile(&payload.profile_id).await?)
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::CREATE_PROFILE, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: CreateProfilePayload = serde_json::from_value(payload)?;
                let mode = payload.mode.as_deref().map(parse_environment).transpose()?;
                encode(
                    handle
                        .create_profile(&payload.name, payload.description, mode)
                        .await?,
                )
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::CLONE_PROFILE, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: CloneProfilePayload = serde_json::from_value(payload)?;
                encode(
                    handle
                        .clone_profile(&payload.source_id, &payload.new_name)
                        .await?,
                )
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::RENAME_PROFILE, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: RenameProfilePayload = serde_json::from_value(payload)?;
                encode(
                    handle
                        .rename_profile(&payload.profile_id, &payload.new_name, payload.description)
                        .await?,
                )
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::DELETE_PROFILE, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: DeleteProfilePayload = serde_json::from_value(payload)?;
                encode(handle.delete_profile(&payload.profile_id).await?)
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::UPDATE_PROFILE, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: UpdateProfilePayload = serde_json::from_value(payload)?;
                encode(
                    handle
                        .update_profile(&payload.profile_id, payload.updates)
                        .await?,
                )
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::SET_ENVIRONMENT, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: SetEnvironmentPayload = serde_json::from_value(payload)?;
                let environment = parse_environment(&payload.environment)?;
                encode(handle.set_environment(environment).await?)
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::SET_ACTIVE_BINDSET, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: SetActiveBindsetPayload = serde_json::from_value(payload)?;
                encode(handle.set_active_bindset(payload.bindset).await?)
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::GET_KEYS, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: GetKeysPayload = serde_json::from_value(payload)?;
                let environment = parse_environment(&payload.environment)?;
                encode(handle.get_keys(environment).await?)
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::GET_KEY_COMMANDS, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: GetKeyCommandsPayload = serde_json::from_value(payload)?;
                let environment = parse_environment(&payload.environment)?;
                encode(handle.get_key_commands(environment, &payload.key).await?)
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::GET_SETTINGS, {
        let handle = handle.clone();
        move |_payload| {
            let handle = handle.clone();
            async move { encode(handle.get_settings().await?) }
        }
    }));

    handles.push(rpc::respond(bus, topics::UPDATE_SETTINGS, {
        let handle = handle.clone();
        move |payload| {
            let handle = handle.clone();
            async move {
                let payload: UpdateSettingsPayload = serde_json::from_value(payload)?;
                encode(handle.update_settings(payload.settings).await?)
            }
        }
    }));

    handles.push(rpc::respond(bus, topics::RELOAD_STATE, {
        let handle = handle.clone();
        move |_payload| {
            let handle = handle.clone();
            async move {
                handle.reload_state().await?;
                encode(ReloadStateResult { success: true })
            }
        }
    }));

    info!(topic_count = handles.len(), "RPC surface registered");
    RpcSurface { handles }
}

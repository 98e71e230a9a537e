//! Typed in-process handle to the coordinator actor

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::{BindsetSelector, Environment, ProfileUpdates, StateSnapshot};

use super::messages::{
    CloneProfileResult, CoordCommand, CoordError, CoordResult, CreateProfileResult,
    DeleteProfileResult, GetKeyCommandsResult, GetKeysResult, RenameProfileResult,
    SetActiveBindsetResult, SetEnvironmentResult, SettingsResult, SwitchProfileResult,
    UpdateProfileResult,
};

/// Handle to send commands to the coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordCommand>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordCommand>) -> Self {
        Self { tx }
    }

    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<CoordResult<T>>) -> CoordCommand,
    ) -> CoordResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| CoordError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordError::ChannelClosed)?
    }

    /// Hydrate state from storage, bootstrapping defaults when empty
    pub async fn load_initial_state(&self) -> CoordResult<StateSnapshot> {
        debug!("load_initial_state: called");
        self.send(|reply| CoordCommand::LoadInitialState { reply }).await
    }

    /// Full snapshot for a late-joining subscriber
    pub async fn get_current_state(&self) -> CoordResult<StateSnapshot> {
        debug!("get_current_state: called");
        self.send(|reply| CoordCommand::GetCurrentState { reply }).await
    }

    pub async fn switch_profile(&self, profile_id: &str) -> CoordResult<SwitchProfileResult> {
        debug!(%profile_id, "switch_profile: called");
        let profile_id = profile_id.to_string();
        self.send(|reply| CoordCommand::SwitchProfile { profile_id, reply }).await
    }

    pub async fn create_profile(
        &self,
        name: &str,
        description: Option<String>,
        mode: Option<Environment>,
    ) -> CoordResult<CreateProfileResult> {
        debug!(%name, "create_profile: called");
        let name = name.to_string();
        self.send(|reply| CoordCommand::CreateProfile {
            name,
            description,
            mode,
            reply,
        })
        .await
    }

    pub async fn clone_profile(
        &self,
        source_id: &str,
        new_name: &str,
    ) -> CoordResult<CloneProfileResult> {
        debug!(%source_id, %new_name, "clone_profile: called");
        let source_id = source_id.to_string();
        let new_name = new_name.to_string();
        self.send(|reply| CoordCommand::CloneProfile {
            source_id,
            new_name,
            reply,
        })
        .await
    }

    pub async fn rename_profile(
        &self,
        profile_id: &str,
        new_name: &str,
        description: Option<String>,
    ) -> CoordResult<RenameProfileResult> {
        debug!(%profile_id, %new_name, "rename_profile: called");
        let profile_id = profile_id.to_string();
        let new_name = new_name.to_string();
        self.send(|reply| CoordCommand::RenameProfile {
            profile_id,
            new_name,
            description,
            reply,
        })
        .await
    }

    pub async fn delete_profile(&self, profile_id: &str) -> CoordResult<DeleteProfileResult> {
        debug!(%profile_id, "delete_profile: called");
        let profile_id = profile_id.to_string();
        self.send(|reply| CoordCommand::DeleteProfile { profile_id, reply }).await
    }

    pub async fn update_profile(
        &self,
        profile_id: &str,
        updates: ProfileUpdates,
    ) -> CoordResult<UpdateProfileResult> {
        debug!(%profile_id, "update_profile: called");
        let profile_id = profile_id.to_string();
        self.send(|reply| CoordCommand::UpdateProfile {
            profile_id,
            updates,
            reply,
        })
        .await
    }

    pub async fn set_environment(&self, environment: Environment) -> CoordResult<SetEnvironmentResult> {
        debug!(%environment, "set_environment: called");
        self.send(|reply| CoordCommand::SetEnvironment { environment, reply }).await
    }

    pub async fn set_active_bindset(
        &self,
        bindset: BindsetSelector,
    ) -> CoordResult<SetActiveBindsetResult> {
        debug!(bindset = %bindset.as_str(), "set_active_bindset: called");
        self.send(|reply| CoordCommand::SetActiveBindset { bindset, reply }).await
    }

    pub async fn get_keys(&self, environment: Environment) -> CoordResult<GetKeysResult> {
        debug!(%environment, "get_keys: called");
        self.send(|reply| CoordCommand::GetKeys { environment, reply }).await
    }

    pub async fn get_key_commands(
        &self,
        environment: Environment,
        key: &str,
    ) -> CoordResult<GetKeyCommandsResult> {
        debug!(%environment, %key, "get_key_commands: called");
        let key = key.to_string();
        self.send(|reply| CoordCommand::GetKeyCommands {
            environment,
            key,
            reply,
        })
        .await
    }

    pub async fn get_settings(&self) -> CoordResult<SettingsResult> {
        debug!("get_settings: called");
        self.send(|reply| CoordCommand::GetSettings { reply }).await
    }

    pub async fn update_settings(&self, settings: Map<String, Value>) -> CoordResult<SettingsResult> {
        debug!(entry_count = settings.len(), "update_settings: called");
        self.send(|reply| CoordCommand::UpdateSettings { settings, reply }).await
    }

    /// Re-hydrate from storage, picking up out-of-band document changes
    pub async fn reload_state(&self) -> CoordResult<StateSnapshot> {
        debug!("reload_state: called");
        self.send(|reply| CoordCommand::ReloadState { reply }).await
    }

    /// Stop the actor; outstanding handles error with `ChannelClosed` afterwards
    pub async fn shutdown(&self) -> CoordResult<()> {
        self.tx
            .send(CoordCommand::Shutdown)
            .await
            .map_err(|_| CoordError::ChannelClosed)
    }
}

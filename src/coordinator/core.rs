//! Coordinator - actor that owns the application state
//!
//! Single writer for [`AppState`]: every mutation flows through the command
//! channel, is persisted before the in-memory cache is touched, and is then
//! announced on the bus.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::config::CoordinatorConfig;
use crate::domain::normalize::{normalize_profile, normalize_state};
use crate::domain::{
    build_virtual_profile, derive_profile_id, AppState, BindsetSelector, Environment, Profile,
    ProfileUpdates, StateSnapshot, VirtualProfile,
};
use crate::events::{self, broadcast, Delivery, StateEvent};
use crate::rpc;
use crate::storage::StorageBackend;

use super::handle::CoordinatorHandle;
use super::merge::apply_updates;
use super::messages::{
    topics, CloneProfileResult, CoordCommand, CoordError, CoordResult, CreateProfileResult,
    DeleteProfileResult, GetKeyCommandsResult, GetKeysResult, RenameProfileResult,
    SetActiveBindsetResult, SetEnvironmentResult, SettingsResult, SwitchProfileResult,
    UpdateProfileResult,
};

/// Spawn the coordinator actor
///
/// Returns the cloneable typed handle; the actor runs until every handle is
/// dropped or a `Shutdown` command arrives.
pub fn spawn(
    config: CoordinatorConfig,
    bus: Arc<Bus>,
    storage: Arc<dyn StorageBackend>,
) -> CoordinatorHandle {
    let (tx, rx) = mpsc::channel(config.channel_buffer);
    let core = Coordinator {
        state: AppState::new(config.state_version.clone()),
        active_bindset: BindsetSelector::Primary,
        needs_default_profiles: false,
        config,
        bus,
        storage,
    };
    tokio::spawn(actor_loop(core, rx));
    info!("Coordinator spawned");
    CoordinatorHandle::new(tx)
}

async fn actor_loop(mut core: Coordinator, mut rx: mpsc::Receiver<CoordCommand>) {
    debug!("Coordinator actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            CoordCommand::LoadInitialState { reply } => {
                let result = core.load_initial_state().await;
                let _ = reply.send(result);
            }
            CoordCommand::GetCurrentState { reply } => {
                let _ = reply.send(Ok(core.snapshot()));
            }
            CoordCommand::SwitchProfile { profile_id, reply } => {
                let result = core.switch_profile(&profile_id).await;
                let _ = reply.send(result);
            }
            CoordCommand::CreateProfile {
                name,
                description,
                mode,
                reply,
            } => {
                let result = core.create_profile(&name, description, mode).await;
                let _ = reply.send(result);
            }
            CoordCommand::CloneProfile {
                source_id,
                new_name,
                reply,
            } => {
                let result = core.clone_profile(&source_id, &new_name).await;
                let _ = reply.send(result);
            }
            CoordCommand::RenameProfile {
                profile_id,
                new_name,
                description,
                reply,
            } => {
                let result = core.rename_profile(&profile_id, &new_name, description).await;
                let _ = reply.send(result);
            }
            CoordCommand::DeleteProfile { profile_id, reply } => {
                let result = core.delete_profile(&profile_id).await;
                let _ = reply.send(result);
            }
            CoordCommand::UpdateProfile {
                profile_id,
                updates,
                reply,
            } => {
                let result = core.update_profile(&profile_id, updates).await;
                let _ = reply.send(result);
            }
            CoordCommand::SetEnvironment { environment, reply } => {
                let result = core.set_environment(environment).await;
                let _ = reply.send(result);
            }
            CoordCommand::SetActiveBindset { bindset, reply } => {
                let result = core.set_active_bindset(bindset);
                let _ = reply.send(result);
            }
            CoordCommand::GetKeys { environment, reply } => {
                let _ = reply.send(core.get_keys(environment));
            }
            CoordCommand::GetKeyCommands {
                environment,
                key,
                reply,
            } => {
                let _ = reply.send(core.get_key_commands(environment, &key));
            }
            CoordCommand::GetSettings { reply } => {
                let _ = reply.send(Ok(SettingsResult {
                    settings: core.state.settings.clone(),
                }));
            }
            CoordCommand::UpdateSettings { settings, reply } => {
                let result = core.update_settings(settings).await;
                let _ = reply.send(result);
            }
            CoordCommand::ReloadState { reply } => {
                let result = core.load_initial_state().await;
                let _ = reply.send(result);
            }
            CoordCommand::Shutdown => {
                info!("Coordinator shutting down");
                break;
            }
        }
    }

    debug!("Coordinator actor stopped");
}

struct Coordinator {
    config: CoordinatorConfig,
    bus: Arc<Bus>,
    storage: Arc<dyn StorageBackend>,
    state: AppState,
    active_bindset: BindsetSelector,
    needs_default_profiles: bool,
}

impl Coordinator {
    // === Lifecycle ===

    async fn load_initial_state(&mut self) -> CoordResult<StateSnapshot> {
        debug!("load_initial_state: called");
        let document = self
            .storage
            .get_all_data()
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;

        let mut state = match document {
            Some(mut doc) => {
                normalize_state(&mut doc);
                serde_json::from_value::<AppState>(doc)
                    .map_err(|e| CoordError::Storage(format!("Malformed state document: {e}")))?
            }
            None => AppState::new(self.config.state_version.clone()),
        };

        for profile in state.profiles.values_mut() {
            profile.ensure_build_environments();
        }

        // A persisted current profile that no longer exists is dropped
        if let Some(current) = &state.current_profile {
            if !state.profiles.contains_key(current) {
                warn!(%current, "load_initial_state: persisted current profile missing");
                state.current_profile = state.profiles.keys().next().cloned();
            }
        } else {
            state.current_profile = state.profiles.keys().next().cloned();
        }

        self.state = state;
        self.active_bindset = BindsetSelector::Primary;
        self.needs_default_profiles = self.state.profiles.is_empty();

        let bootstrapped = self.needs_default_profiles;
        if bootstrapped {
            self.bootstrap_default_profiles().await;
            self.needs_default_profiles = false;
        }

        info!(
            profile_count = self.state.profiles.len(),
            current_profile = ?self.state.current_profile,
            "load_initial_state: state ready"
        );
        broadcast(
            &self.bus,
            &StateEvent::ProfilesInitialized(events::ProfilesInitializedEvent {
                profile_count: self.state.profiles.len(),
                current_profile: self.state.current_profile.clone(),
                timestamp: Utc::now(),
            }),
            Delivery::Sync,
        );

        // The initial switch follows the initialized announcement
        if bootstrapped {
            if let Some(event) = self.current_switched_event() {
                broadcast(&self.bus, &StateEvent::ProfileSwitched(event), Delivery::Sync);
            }
        }

        Ok(self.snapshot())
    }

    /// Populate an empty state from the default-profiles provider
    ///
    /// Any failure falls back to a single minimal profile; bootstrap never
    /// leaves the app with zero profiles and never propagates an error.
    async fn bootstrap_default_profiles(&mut self) {
        debug!("bootstrap_default_profiles: called");
        let mut profiles = std::collections::BTreeMap::new();

        match rpc::request(
            &self.bus,
            topics::DEFAULT_PROFILES,
            json!({}),
            self.config.bootstrap_timeout(),
        )
        .await
        {
            Ok(serde_json::Value::Object(templates)) => {
                for (id, mut template) in templates {
                    normalize_profile(&mut template);
                    match serde_json::from_value::<Profile>(template) {
                        Ok(mut profile) => {
                            profile.ensure_build_environments();
                            profiles.insert(id, profile);
                        }
                        Err(e) => {
                            warn!(%id, error = %e, "bootstrap: skipping malformed default profile");
                        }
                    }
                }
            }
            Ok(other) => {
                warn!(payload = %other, "bootstrap: provider returned a non-object payload");
            }
            Err(e) => {
                warn!(error = %e, "bootstrap: default-profiles provider unavailable");
            }
        }

        if profiles.is_empty() {
            let profile = Profile::new("Default", "", self.config.default_environment);
            profiles.insert(derive_profile_id("Default"), profile);
        }

        self.state.profiles = profiles;
        self.state.current_profile = self.state.profiles.keys().next().cloned();
        if let Some(current) = &self.state.current_profile {
            self.state.current_environment = self.state.profiles[current].current_environment;
        }
        self.state.touch();

        if let Err(e) = self.storage.save_all_data(&self.state).await {
            warn!(error = %e, "bootstrap: could not persist bootstrapped state");
        }

        info!(
            profile_count = self.state.profiles.len(),
            "bootstrap: profiles installed"
        );
    }

    // === Profile CRUD ===

    async fn switch_profile(&mut self, profile_id: &str) -> CoordResult<SwitchProfileResult> {
        debug!(%profile_id, "switch_profile: called");
        if self.state.current_profile.as_deref() == Some(profile_id) {
            return Ok(SwitchProfileResult {
                success: true,
                switched: false,
                profile: self.current_virtual_profile(),
                message: format!("Profile {profile_id} is already active"),
            });
        }
        if !self.state.profiles.contains_key(profile_id) {
            return Err(CoordError::ProfileNotFound(profile_id.to_string()));
        }

        let mut candidate = self.state.clone();
        candidate.current_profile = Some(profile_id.to_string());
        candidate.current_environment = candidate.profiles[profile_id].current_environment;
        candidate.touch();
        self.storage
            .save_all_data(&candidate)
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;

        self.state = candidate;
        self.active_bindset = BindsetSelector::Primary;

        let event = self.current_switched_event();
        let virtual_profile = event.as_ref().map(|e| e.profile.clone());
        if let Some(event) = event {
            broadcast(&self.bus, &StateEvent::ProfileSwitched(event), Delivery::Sync);
        }

        let name = self.state.profiles[profile_id].name.clone();
        info!(%profile_id, %name, "switch_profile: switched");
        Ok(SwitchProfileResult {
            success: true,
            switched: true,
            profile: virtual_profile,
            message: format!("Switched to {name}"),
        })
    }

    async fn create_profile(
        &mut self,
        name: &str,
        description: Option<String>,
        mode: Option<Environment>,
    ) -> CoordResult<CreateProfileResult> {
        debug!(%name, "create_profile: called");
        let name = name.trim();
        let profile_id = derive_profile_id(name);
        if name.is_empty() || profile_id.is_empty() {
            return Err(CoordError::NameRequired);
        }
        if self.state.profiles.contains_key(&profile_id) {
            return Err(CoordError::ProfileExists(profile_id));
        }

        let profile = Profile::new(
            name,
            description.unwrap_or_default(),
            mode.unwrap_or(self.config.default_environment),
        );
        self.storage
            .save_profile(&profile_id, &profile)
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;

        self.state.profiles.insert(profile_id.clone(), profile.clone());
        self.state.touch();

        broadcast(
            &self.bus,
            &StateEvent::ProfileCreated(events::ProfileCreatedEvent {
                profile_id: profile_id.clone(),
                profile: profile.clone(),
                timestamp: Utc::now(),
            }),
            Delivery::Deferred,
        );

        info!(%profile_id, "create_profile: created");
        Ok(CreateProfileResult {
            success: true,
            profile_id,
            profile,
            message: format!("Profile {name} created"),
        })
    }

    async fn clone_profile(
        &mut self,
        source_id: &str,
        new_name: &str,
    ) -> CoordResult<CloneProfileResult> {
        debug!(%source_id, %new_name, "clone_profile: called");
        let new_name = new_name.trim();
        let profile_id = derive_profile_id(new_name);
        if new_name.is_empty() || profile_id.is_empty() {
            return Err(CoordError::NameRequired);
        }
        let Some(source) = self.state.profiles.get(source_id) else {
            return Err(CoordError::ProfileNotFound(source_id.to_string()));
        };
        if self.state.profiles.contains_key(&profile_id) {
            return Err(CoordError::ProfileExists(profile_id));
        }

        let now = Utc::now();
        let mut profile = source.clone();
        profile.name = new_name.to_string();
        profile.created = now;
        profile.last_modified = now;

        self.storage
            .save_profile(&profile_id, &profile)
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;

        self.state.profiles.insert(profile_id.clone(), profile.clone());
        self.state.touch();

        broadcast(
            &self.bus,
            &StateEvent::ProfileCreated(events::ProfileCreatedEvent {
                profile_id: profile_id.clone(),
                profile: profile.clone(),
                timestamp: now,
            }),
            Delivery::Deferred,
        );

        info!(%source_id, %profile_id, "clone_profile: cloned");
        Ok(CloneProfileResult {
            success: true,
            profile_id,
            profile,
        })
    }

    async fn rename_profile(
        &mut self,
        profile_id: &str,
        new_name: &str,
        description: Option<String>,
    ) -> CoordResult<RenameProfileResult> {
        debug!(%profile_id, %new_name, "rename_profile: called");
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(CoordError::NameRequired);
        }
        let Some(existing) = self.state.profiles.get(profile_id) else {
            return Err(CoordError::ProfileNotFound(profile_id.to_string()));
        };

        let mut profile = existing.clone();
        profile.name = new_name.to_string();
        if let Some(description) = description.clone() {
            profile.description = description;
        }
        profile.touch();

        self.storage
            .save_profile(profile_id, &profile)
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;

        self.state.profiles.insert(profile_id.to_string(), profile.clone());
        self.state.touch();

        let updates = ProfileUpdates {
            properties: Some(crate::domain::ProfileProperties {
                name: Some(new_name.to_string()),
                description,
                current_environment: None,
            }),
            ..Default::default()
        };
        broadcast(
            &self.bus,
            &StateEvent::ProfileUpdated(events::ProfileUpdatedEvent {
                profile_id: profile_id.to_string(),
                profile: profile.clone(),
                updates,
                timestamp: Utc::now(),
            }),
            Delivery::Deferred,
        );

        Ok(RenameProfileResult {
            success: true,
            profile,
        })
    }

    async fn delete_profile(&mut self, profile_id: &str) -> CoordResult<DeleteProfileResult> {
        debug!(%profile_id, "delete_profile: called");
        if !self.state.profiles.contains_key(profile_id) {
            return Err(CoordError::ProfileNotFound(profile_id.to_string()));
        }
        if self.state.profiles.len() == 1 {
            return Err(CoordError::LastProfile);
        }

        let was_current = self.state.current_profile.as_deref() == Some(profile_id);
        let mut candidate = self.state.clone();
        candidate.profiles.remove(profile_id);
        let mut switched_profile = None;
        if was_current {
            let survivor = candidate.profiles.keys().next().cloned();
            if let Some(survivor_id) = &survivor {
                candidate.current_environment =
                    candidate.profiles[survivor_id].current_environment;
            }
            candidate.current_profile = survivor.clone();
            switched_profile = survivor;
        }
        candidate.touch();

        if was_current {
            self.storage
                .save_all_data(&candidate)
                .await
                .map_err(|e| CoordError::Storage(e.to_string()))?;
        } else {
            self.storage
                .delete_profile(profile_id)
                .await
                .map_err(|e| CoordError::Storage(e.to_string()))?;
        }

        self.state = candidate;
        if was_current {
            self.active_bindset = BindsetSelector::Primary;
            if let Some(event) = self.current_switched_event() {
                broadcast(&self.bus, &StateEvent::ProfileSwitched(event), Delivery::Sync);
            }
        }
        broadcast(
            &self.bus,
            &StateEvent::ProfileDeleted(events::ProfileDeletedEvent {
                profile_id: profile_id.to_string(),
                switched_profile: switched_profile.clone(),
                timestamp: Utc::now(),
            }),
            Delivery::Deferred,
        );

        info!(%profile_id, ?switched_profile, "delete_profile: deleted");
        Ok(DeleteProfileResult {
            success: true,
            switched_profile,
        })
    }

    async fn update_profile(
        &mut self,
        profile_id: &str,
        updates: ProfileUpdates,
    ) -> CoordResult<UpdateProfileResult> {
        debug!(%profile_id, "update_profile: called");
        if updates.is_empty() {
            return Err(CoordError::UpdatesRequired);
        }
        let Some(existing) = self.state.profiles.get(profile_id) else {
            return Err(CoordError::ProfileNotFound(profile_id.to_string()));
        };

        let mut profile = existing.clone();
        apply_updates(&mut profile, &updates);

        self.storage
            .save_profile(profile_id, &profile)
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;

        self.state.profiles.insert(profile_id.to_string(), profile.clone());
        self.state.touch();

        // Properties-only updates persist without an announcement
        if updates.has_structural_ops() {
            broadcast(
                &self.bus,
                &StateEvent::ProfileUpdated(events::ProfileUpdatedEvent {
                    profile_id: profile_id.to_string(),
                    profile: profile.clone(),
                    updates,
                    timestamp: Utc::now(),
                }),
                Delivery::Deferred,
            );
        }

        Ok(UpdateProfileResult {
            success: true,
            profile,
        })
    }

    // === Environment, keys, settings ===

    async fn set_environment(&mut self, environment: Environment) -> CoordResult<SetEnvironmentResult> {
        debug!(%environment, "set_environment: called");
        let from = self.state.current_environment;
        if from == environment {
            return Ok(SetEnvironmentResult {
                success: true,
                environment,
            });
        }

        let mut candidate = self.state.clone();
        candidate.current_environment = environment;
        if let Some(current) = candidate.current_profile.clone() {
            if let Some(profile) = candidate.profiles.get_mut(&current) {
                profile.current_environment = environment;
                profile.touch();
            }
        }
        candidate.touch();
        self.storage
            .save_all_data(&candidate)
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;
        self.state = candidate;

        broadcast(
            &self.bus,
            &StateEvent::EnvironmentChanged(events::EnvironmentChangedEvent {
                from,
                to: environment,
                timestamp: Utc::now(),
            }),
            Delivery::Sync,
        );

        Ok(SetEnvironmentResult {
            success: true,
            environment,
        })
    }

    fn set_active_bindset(&mut self, bindset: BindsetSelector) -> CoordResult<SetActiveBindsetResult> {
        debug!(bindset = %bindset.as_str(), "set_active_bindset: called");
        if let BindsetSelector::Named(name) = &bindset {
            let current = self
                .state
                .current_profile
                .as_ref()
                .ok_or(CoordError::NoCurrentProfile)?;
            if !self.state.profiles[current].bindsets.contains_key(name) {
                return Err(CoordError::BindsetNotFound(name.clone()));
            }
        }
        self.active_bindset = bindset.clone();
        Ok(SetActiveBindsetResult {
            success: true,
            bindset,
        })
    }

    /// Primary keys for one environment with the active bindset's keys
    /// shadowing same-named entries
    fn overlaid_keys(
        &self,
        environment: Environment,
    ) -> CoordResult<std::collections::BTreeMap<String, Vec<String>>> {
        let current = self
            .state
            .current_profile
            .as_ref()
            .ok_or(CoordError::NoCurrentProfile)?;
        let profile = &self.state.profiles[current];

        let mut keys = profile
            .builds
            .get(&environment)
            .map(|build| build.keys.clone())
            .unwrap_or_default();
        if let BindsetSelector::Named(name) = &self.active_bindset {
            if let Some(overlay) = profile
                .bindsets
                .get(name)
                .and_then(|bindset| bindset.environment(environment))
            {
                for (key, commands) in &overlay.keys {
                    keys.insert(key.clone(), commands.clone());
                }
            }
        }
        Ok(keys)
    }

    fn get_keys(&self, environment: Environment) -> CoordResult<GetKeysResult> {
        debug!(%environment, "get_keys: called");
        Ok(GetKeysResult {
            environment,
            keys: self.overlaid_keys(environment)?,
        })
    }

    fn get_key_commands(&self, environment: Environment, key: &str) -> CoordResult<GetKeyCommandsResult> {
        debug!(%environment, %key, "get_key_commands: called");
        let commands = self
            .overlaid_keys(environment)?
            .remove(key)
            .ok_or_else(|| CoordError::KeyNotFound(key.to_string()))?;
        Ok(GetKeyCommandsResult {
            environment,
            key: key.to_string(),
            commands,
        })
    }

    async fn update_settings(
        &mut self,
        settings: serde_json::Map<String, serde_json::Value>,
    ) -> CoordResult<SettingsResult> {
        debug!(entry_count = settings.len(), "update_settings: called");
        let mut merged = self.state.settings.clone();
        for (key, value) in settings {
            merged.insert(key, value);
        }

        self.storage
            .save_settings(&merged)
            .await
            .map_err(|e| CoordError::Storage(e.to_string()))?;

        self.state.settings = merged.clone();
        self.state.touch();

        broadcast(
            &self.bus,
            &StateEvent::SettingsChanged(events::SettingsChangedEvent {
                settings: merged.clone(),
                timestamp: Utc::now(),
            }),
            Delivery::Deferred,
        );

        Ok(SettingsResult { settings: merged })
    }

    // === Projections ===

    fn current_virtual_profile(&mut self) -> Option<VirtualProfile> {
        let current = self.state.current_profile.clone()?;
        let environment = self.state.current_environment;
        let profile = self.state.profiles.get_mut(&current)?;
        Some(build_virtual_profile(&current, profile, environment))
    }

    fn current_switched_event(&mut self) -> Option<events::ProfileSwitchedEvent> {
        let profile_id = self.state.current_profile.clone()?;
        let environment = self.state.current_environment;
        let profile = self.current_virtual_profile()?;
        Some(events::ProfileSwitchedEvent {
            profile_id,
            profile,
            environment,
            timestamp: Utc::now(),
        })
    }

    fn snapshot(&mut self) -> StateSnapshot {
        let virtual_profile = self.current_virtual_profile();
        StateSnapshot {
            current_profile: self.state.current_profile.clone(),
            current_environment: self.state.current_environment,
            profiles: self.state.profiles.clone(),
            settings: self.state.settings.clone(),
            metadata: self.state.metadata.clone(),
            active_bindset: self.active_bindset.clone(),
            virtual_profile,
        }
    }
}

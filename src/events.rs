//! Broadcast event catalog
//!
//! Every state change the coordinator commits is announced on a fixed topic.
//! Payloads carry enough context (ids, before/after, timestamp) for a
//! subscriber to update its cache without a follow-up query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::bus::Bus;
use crate::domain::{Environment, Profile, ProfileUpdates, VirtualProfile};

/// Broadcast topic names
pub mod topics {
    pub const PROFILE_SWITCHED: &str = "profile:switched";
    pub const PROFILE_CREATED: &str = "profile:created";
    pub const PROFILE_UPDATED: &str = "profile:updated";
    pub const PROFILE_DELETED: &str = "profile:deleted";
    pub const ENVIRONMENT_CHANGED: &str = "environment:changed";
    pub const SETTINGS_CHANGED: &str = "settings:changed";
    pub const PROFILES_INITIALIZED: &str = "profiles:initialized";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSwitchedEvent {
    pub profile_id: String,
    pub profile: VirtualProfile,
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCreatedEvent {
    pub profile_id: String,
    pub profile: Profile,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdatedEvent {
    pub profile_id: String,
    pub profile: Profile,
    /// The original operations payload, for listeners that react selectively
    pub updates: ProfileUpdates,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDeletedEvent {
    pub profile_id: String,
    /// Set when deleting the current profile forced an auto-switch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switched_profile: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentChangedEvent {
    pub from: Environment,
    pub to: Environment,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsChangedEvent {
    pub settings: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilesInitializedEvent {
    pub profile_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_profile: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A state-change announcement and its topic
#[derive(Debug, Clone)]
pub enum StateEvent {
    ProfileSwitched(ProfileSwitchedEvent),
    ProfileCreated(ProfileCreatedEvent),
    ProfileUpdated(ProfileUpdatedEvent),
    ProfileDeleted(ProfileDeletedEvent),
    EnvironmentChanged(EnvironmentChangedEvent),
    SettingsChanged(SettingsChangedEvent),
    ProfilesInitialized(ProfilesInitializedEvent),
}

impl StateEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ProfileSwitched(_) => topics::PROFILE_SWITCHED,
            Self::ProfileCreated(_) => topics::PROFILE_CREATED,
            Self::ProfileUpdated(_) => topics::PROFILE_UPDATED,
            Self::ProfileDeleted(_) => topics::PROFILE_DELETED,
            Self::EnvironmentChanged(_) => topics::ENVIRONMENT_CHANGED,
            Self::SettingsChanged(_) => topics::SETTINGS_CHANGED,
            Self::ProfilesInitialized(_) => topics::PROFILES_INITIALIZED,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::ProfileSwitched(event) => serde_json::to_value(event),
            Self::ProfileCreated(event) => serde_json::to_value(event),
            Self::ProfileUpdated(event) => serde_json::to_value(event),
            Self::ProfileDeleted(event) => serde_json::to_value(event),
            Self::EnvironmentChanged(event) => serde_json::to_value(event),
            Self::SettingsChanged(event) => serde_json::to_value(event),
            Self::ProfilesInitialized(event) => serde_json::to_value(event),
        }
    }
}

/// Broadcast delivery mode
///
/// `Sync` is used for state transitions subscribers must observe before the
/// triggering call returns; `Deferred` for best-effort notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sync,
    Deferred,
}

/// Publish a state event on its topic
pub fn broadcast(bus: &Bus, event: &StateEvent, delivery: Delivery) {
    let payload = match event.payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(topic = event.topic(), error = %e, "broadcast: could not encode event");
            return;
        }
    };
    match delivery {
        Delivery::Sync => bus.publish(event.topic(), payload),
        Delivery::Deferred => bus.publish_deferred(event.topic(), payload),
    }
}

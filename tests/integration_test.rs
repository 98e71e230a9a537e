//! Integration tests for BindSync
//!
//! These tests run the whole stack: a bus, a coordinator with real storage,
//! the registered RPC surface, and a typed client on the other side.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tempfile::TempDir;

use bindsync::bus::Bus;
use bindsync::client::CoordinatorClient;
use bindsync::config::CoordinatorConfig;
use bindsync::coordinator::{self, messages::topics, CoordinatorHandle, RpcSurface};
use bindsync::domain::{
    AddOps, Bindset, BindsetSelector, DeleteOps, Environment, KeyMap, KeyNameList, ProfileUpdates,
};
use bindsync::events::topics as event_topics;
use bindsync::rpc::{self, RpcError};
use bindsync::storage::{FileStorage, MemoryStorage, StorageBackend};

struct Stack {
    bus: Arc<Bus>,
    handle: CoordinatorHandle,
    client: CoordinatorClient,
    _surface: RpcSurface,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn start_stack(storage: Arc<dyn StorageBackend>) -> Stack {
    init_tracing();
    let bus = Arc::new(Bus::with_default_capacity());
    let config = CoordinatorConfig {
        bootstrap_timeout_ms: 200,
        ..Default::default()
    };
    let handle = coordinator::spawn(config, bus.clone(), storage);
    handle
        .load_initial_state()
        .await
        .expect("initial load should succeed");
    let surface = coordinator::register(&bus, &handle);
    let client = CoordinatorClient::new(bus.clone());
    Stack {
        bus,
        handle,
        client,
        _surface: surface,
    }
}

// =============================================================================
// Bootstrap and late join
// =============================================================================

#[tokio::test]
async fn test_bootstrap_without_provider_installs_fallback_profile() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;

    let snapshot = stack.client.get_current_state().await.unwrap();
    assert_eq!(snapshot.profiles.len(), 1);
    assert_eq!(snapshot.current_profile.as_deref(), Some("default"));
    assert_eq!(snapshot.active_bindset, BindsetSelector::Primary);
    assert_eq!(snapshot.virtual_profile.unwrap().name, "Default");
}

#[tokio::test]
async fn test_bootstrap_uses_default_profiles_provider() {
    let bus = Arc::new(Bus::with_default_capacity());
    let _provider = rpc::respond(&bus, topics::DEFAULT_PROFILES, |_payload| async move {
        Ok(json!({
            "tactical": {
                "name": "Tactical",
                "currentEnvironment": "space",
                "builds": { "space": { "keys": { "F1": "FireAll $$ FirePhasers" } } }
            },
            "science": { "name": "Science" }
        }))
    });

    let storage = Arc::new(MemoryStorage::new());
    let handle = coordinator::spawn(
        CoordinatorConfig::default(),
        bus.clone(),
        storage.clone() as Arc<dyn StorageBackend>,
    );
    let mut switched_rx = bus.subscribe(event_topics::PROFILE_SWITCHED);
    let mut init_rx = bus.subscribe(event_topics::PROFILES_INITIALIZED);

    let snapshot = handle.load_initial_state().await.unwrap();
    assert_eq!(snapshot.profiles.len(), 2);
    assert_eq!(snapshot.current_profile.as_deref(), Some("science"));
    // Provider templates pass through normalization
    assert_eq!(
        snapshot.profiles["tactical"].builds[&Environment::Space].keys["F1"],
        vec!["FireAll".to_string(), "FirePhasers".to_string()]
    );

    // Both lifecycle events are synchronous: queued before load returns.
    // profiles:initialized goes out first, then the initial switch; the
    // topics are separate channels, so the order shows in the timestamps.
    let initialized = init_rx.try_recv().unwrap();
    let switched = switched_rx.try_recv().unwrap();
    assert_eq!(initialized["profileCount"], 2);
    assert_eq!(switched["profileId"], "science");
    let initialized_at: DateTime<Utc> =
        serde_json::from_value(initialized["timestamp"].clone()).unwrap();
    let switched_at: DateTime<Utc> =
        serde_json::from_value(switched["timestamp"].clone()).unwrap();
    assert!(initialized_at <= switched_at);

    // And the bootstrapped state was persisted
    let doc = storage.document().unwrap();
    assert!(doc["profiles"]["tactical"].is_object());
}

#[tokio::test]
async fn test_late_joiner_catches_up_from_snapshot_and_events() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;
    stack
        .client
        .create_profile("Escort", None, None)
        .await
        .unwrap();

    // A subscriber arriving now sees the created profile in the snapshot
    let late_client = CoordinatorClient::new(stack.bus.clone());
    let snapshot = late_client.get_current_state().await.unwrap();
    assert!(snapshot.profiles.contains_key("escort"));

    // ...and follows subsequent changes from the broadcast alone
    let mut rx = late_client.subscribe(event_topics::PROFILE_SWITCHED);
    stack.client.switch_profile("escort").await.unwrap();
    let payload = rx.recv().await.unwrap();
    assert_eq!(payload["profileId"], "escort");
    assert_eq!(payload["profile"]["name"], "Escort");
}

// =============================================================================
// CRUD over the bus
// =============================================================================

#[tokio::test]
async fn test_create_switch_delete_event_flow() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;
    let mut created_rx = stack.bus.subscribe(event_topics::PROFILE_CREATED);
    let mut switched_rx = stack.bus.subscribe(event_topics::PROFILE_SWITCHED);
    let mut deleted_rx = stack.bus.subscribe(event_topics::PROFILE_DELETED);

    let created = stack
        .client
        .create_profile("Tac Escort", Some("pvp".into()), Some(Environment::Space))
        .await
        .unwrap();
    assert_eq!(created.profile_id, "tac_escort");
    assert_eq!(created_rx.recv().await.unwrap()["profileId"], "tac_escort");

    let switched = stack.client.switch_profile("tac_escort").await.unwrap();
    assert!(switched.switched);
    assert_eq!(switched_rx.recv().await.unwrap()["profileId"], "tac_escort");

    // Deleting the now-current profile auto-switches back to the survivor
    let deleted = stack.client.delete_profile("tac_escort").await.unwrap();
    assert_eq!(deleted.switched_profile.as_deref(), Some("default"));
    assert_eq!(switched_rx.recv().await.unwrap()["profileId"], "default");
    let payload = deleted_rx.recv().await.unwrap();
    assert_eq!(payload["profileId"], "tac_escort");
    assert_eq!(payload["switchedProfile"], "default");
}

#[tokio::test]
async fn test_last_profile_guard_error_reaches_client_verbatim() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;

    let err = stack.client.delete_profile("default").await.unwrap_err();
    assert!(matches!(err, RpcError::Handler(_)));
    assert_eq!(err.to_string(), "Cannot delete the last profile");
}

#[tokio::test]
async fn test_update_profile_is_non_destructive_over_the_bus() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;

    // Seed two keys, then delete one and add another in one payload
    let seed = ProfileUpdates {
        add: Some(AddOps {
            builds: [(
                Environment::Space,
                KeyMap {
                    keys: [
                        ("F1".to_string(), vec!["FireAll".to_string()]),
                        ("F2".to_string(), vec!["FirePhasers".to_string()]),
                    ]
                    .into(),
                },
            )]
            .into(),
            ..Default::default()
        }),
        ..Default::default()
    };
    stack.client.update_profile("default", seed).await.unwrap();

    let updates = ProfileUpdates {
        delete: Some(DeleteOps {
            builds: [(
                Environment::Space,
                KeyNameList {
                    keys: vec!["F1".to_string()],
                },
            )]
            .into(),
            ..Default::default()
        }),
        add: Some(AddOps {
            builds: [(
                Environment::Space,
                KeyMap {
                    keys: [("F3".to_string(), vec!["Brace".to_string()])].into(),
                },
            )]
            .into(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let result = stack.client.update_profile("default", updates).await.unwrap();

    let keys = &result.profile.builds[&Environment::Space].keys;
    assert!(!keys.contains_key("F1"));
    assert_eq!(keys["F2"], vec!["FirePhasers".to_string()]);
    assert_eq!(keys["F3"], vec!["Brace".to_string()]);
}

#[tokio::test]
async fn test_bindset_overlay_via_client() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;

    let updates = ProfileUpdates {
        add: Some(AddOps {
            builds: [(
                Environment::Space,
                KeyMap {
                    keys: [("F1".to_string(), vec!["FireAll".to_string()])].into(),
                },
            )]
            .into(),
            bindsets: [(
                "Exotic".to_string(),
                Bindset {
                    space: KeyMap {
                        keys: [("F1".to_string(), vec!["GravityWell".to_string()])].into(),
                    },
                    ground: KeyMap::default(),
                },
            )]
            .into(),
            ..Default::default()
        }),
        ..Default::default()
    };
    stack.client.update_profile("default", updates).await.unwrap();

    let keys = stack.client.get_keys(Environment::Space).await.unwrap().keys;
    assert_eq!(keys["F1"], vec!["FireAll".to_string()]);

    stack
        .client
        .set_active_bindset(BindsetSelector::Named("Exotic".to_string()))
        .await
        .unwrap();
    let keys = stack.client.get_keys(Environment::Space).await.unwrap().keys;
    assert_eq!(keys["F1"], vec!["GravityWell".to_string()]);

    let commands = stack
        .client
        .get_key_commands(Environment::Space, "F1")
        .await
        .unwrap();
    assert_eq!(commands.commands, vec!["GravityWell".to_string()]);
}

#[tokio::test]
async fn test_settings_merge_and_broadcast() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;
    let mut rx = stack.bus.subscribe(event_topics::SETTINGS_CHANGED);

    let mut first = serde_json::Map::new();
    first.insert("theme".to_string(), json!("dark"));
    stack.client.update_settings(first).await.unwrap();

    let mut second = serde_json::Map::new();
    second.insert("fontSize".to_string(), json!(14));
    let result = stack.client.update_settings(second).await.unwrap();

    assert_eq!(result.settings["theme"], json!("dark"));
    assert_eq!(result.settings["fontSize"], json!(14));

    let payload = rx.recv().await.unwrap();
    assert_eq!(payload["settings"]["theme"], json!("dark"));
}

#[tokio::test]
async fn test_persist_failure_surfaces_and_cache_stays_consistent() {
    let storage = Arc::new(MemoryStorage::new());
    let stack = start_stack(storage.clone() as Arc<dyn StorageBackend>).await;

    storage.fail_next_save();
    let err = stack
        .client
        .create_profile("Doomed", None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("injected storage failure"));

    // The failed create left no trace; retrying succeeds
    let snapshot = stack.client.get_current_state().await.unwrap();
    assert!(!snapshot.profiles.contains_key("doomed"));
    stack.client.create_profile("Doomed", None, None).await.unwrap();
}

// =============================================================================
// File-backed persistence
// =============================================================================

#[tokio::test]
async fn test_state_survives_restart_with_file_storage() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("state.json");

    {
        let storage = Arc::new(FileStorage::new(&path));
        let stack = start_stack(storage as Arc<dyn StorageBackend>).await;
        stack
            .client
            .create_profile("Carrier", Some("pets".into()), Some(Environment::Ground))
            .await
            .unwrap();
        stack.client.switch_profile("carrier").await.unwrap();
        stack.handle.shutdown().await.unwrap();
    }

    let storage = Arc::new(FileStorage::new(&path));
    let stack = start_stack(storage as Arc<dyn StorageBackend>).await;
    let snapshot = stack.client.get_current_state().await.unwrap();

    assert_eq!(snapshot.current_profile.as_deref(), Some("carrier"));
    assert_eq!(snapshot.current_environment, Environment::Ground);
    assert_eq!(snapshot.profiles["carrier"].description, "pets");
}

#[tokio::test]
async fn test_reload_state_picks_up_external_document_edit() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("state.json");
    let stack = start_stack(Arc::new(FileStorage::new(&path))).await;

    // Simulate an import tool rewriting the document out-of-band
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    doc["profiles"]["imported"] = json!({
        "name": "Imported",
        "builds": { "space": { "keys": { "F4": "Polarize $$ Brace" } } }
    });
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let reload = stack.client.reload_state().await.unwrap();
    assert!(reload.success);

    let snapshot = stack.client.get_current_state().await.unwrap();
    assert_eq!(
        snapshot.profiles["imported"].builds[&Environment::Space].keys["F4"],
        vec!["Polarize".to_string(), "Brace".to_string()]
    );
}

// =============================================================================
// RPC edge cases
// =============================================================================

#[tokio::test]
async fn test_request_without_handler_fails_fast() {
    let bus = Arc::new(Bus::with_default_capacity());
    let client = CoordinatorClient::new(bus);

    let start = std::time::Instant::now();
    let err = client.get_current_state().await.unwrap_err();
    assert!(matches!(err, RpcError::NoHandler(_)));
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_concurrent_clients_do_not_cross_wire() {
    let stack = start_stack(Arc::new(MemoryStorage::new())).await;
    let a = stack.client.clone();
    let b = stack.client.clone();

    let (keys, snapshot) = tokio::join!(a.get_keys(Environment::Space), b.get_current_state());
    assert_eq!(keys.unwrap().environment, Environment::Space);
    assert_eq!(snapshot.unwrap().current_profile.as_deref(), Some("default"));
}

//! Canonicalization of loaded documents
//!
//! Profiles from storage (or an import) may carry key commands in legacy
//! shapes. Every profile passes through here before it is trusted, once at
//! initial load and again after any bulk reload.
//!
//! Accepted command representations for a single key:
//! - canonical: array of command strings
//! - legacy flat string, `$$`-separated
//! - legacy rich-editor array of `{ "command": "..." }` objects

use serde_json::{Value, json};
use tracing::debug;

/// Canonicalize one key's command value into an ordered string sequence
pub fn canonical_commands(value: &Value) -> Vec<String> {
    match value {
        Value::String(raw) => raw
            .split("$$")
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(command) => Some(command.clone()),
                Value::Object(fields) => fields.get("command").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_keys(keys: &mut Value) {
    let Some(map) = keys.as_object_mut() else { return };
    for value in map.values_mut() {
        *value = json!(canonical_commands(value));
    }
}

fn normalize_build(build: &mut Value) {
    if let Some(keys) = build.get_mut("keys") {
        normalize_keys(keys);
    }
}

/// Canonicalize one profile document in place
pub fn normalize_profile(profile: &mut Value) {
    if let Some(builds) = profile.get_mut("builds").and_then(Value::as_object_mut) {
        for build in builds.values_mut() {
            normalize_build(build);
        }
    }
    if let Some(bindsets) = profile.get_mut("bindsets").and_then(Value::as_object_mut) {
        for bindset in bindsets.values_mut() {
            for env in ["space", "ground"] {
                if let Some(build) = bindset.get_mut(env) {
                    normalize_build(build);
                }
            }
        }
    }
}

/// Canonicalize every profile in a loaded state document in place
pub fn normalize_state(state: &mut Value) {
    let Some(profiles) = state.get_mut("profiles").and_then(Value::as_object_mut) else {
        return;
    };
    debug!(profile_count = profiles.len(), "normalize_state");
    for profile in profiles.values_mut() {
        normalize_profile(profile);
    }
}

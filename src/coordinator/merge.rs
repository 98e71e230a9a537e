//! Explicit-operations merge engine
//!
//! Applies a `ProfileUpdates` payload to a profile in a fixed order:
//! delete, add, modify, properties. Each section only touches the entries
//! it names; everything else on the profile is left untouched.

use tracing::debug;

use crate::domain::{
    AddOps, BindsetKeyPatch, DeleteOps, KeyMap, MetadataEntry, ModifyOps, Profile,
    ProfileProperties, ProfileUpdates,
};

/// Apply an update payload to a profile in place
pub fn apply_updates(profile: &mut Profile, updates: &ProfileUpdates) {
    debug!(
        has_delete = updates.delete.is_some(),
        has_add = updates.add.is_some(),
        has_modify = updates.modify.is_some(),
        has_properties = updates.properties.is_some(),
        "apply_updates"
    );
    if let Some(delete) = &updates.delete {
        apply_delete(profile, delete);
    }
    if let Some(add) = &updates.add {
        apply_add(profile, add);
    }
    if let Some(modify) = &updates.modify {
        apply_modify(profile, modify);
    }
    if let Some(properties) = &updates.properties {
        apply_properties(profile, properties);
    }
    profile.touch();
}

fn apply_delete(profile: &mut Profile, delete: &DeleteOps) {
    for name in &delete.aliases {
        profile.aliases.remove(name);
        profile.alias_metadata.remove(name);
    }
    for (env, key_list) in &delete.builds {
        if let Some(build) = profile.builds.get_mut(env) {
            for key in &key_list.keys {
                build.keys.remove(key);
            }
        }
        if let Some(metadata) = profile.keybind_metadata.get_mut(env) {
            for key in &key_list.keys {
                metadata.remove(key);
            }
        }
    }
    for name in &delete.bindsets {
        profile.bindsets.remove(name);
        profile.bindset_metadata.remove(name);
    }
}

fn apply_add(profile: &mut Profile, add: &AddOps) {
    for (name, alias) in &add.aliases {
        profile.aliases.insert(name.clone(), alias.clone());
    }
    for (env, key_map) in &add.builds {
        let build = profile.builds.entry(*env).or_default();
        for (key, commands) in &key_map.keys {
            build.keys.insert(key.clone(), commands.clone());
        }
    }
    for (name, bindset) in &add.bindsets {
        profile.bindsets.insert(name.clone(), bindset.clone());
    }
}

fn apply_modify(profile: &mut Profile, modify: &ModifyOps) {
    // Aliases: field-by-field patches, existing entries only
    for (name, patch) in &modify.aliases {
        if let Some(alias) = profile.aliases.get_mut(name) {
            if let Some(commands) = &patch.commands {
                alias.commands = commands.clone();
            }
            if let Some(description) = &patch.description {
                alias.description = Some(description.clone());
            }
        }
    }

    // Builds: replace the command list only when the key already exists
    for (env, key_map) in &modify.builds {
        if let Some(build) = profile.builds.get_mut(env) {
            for (key, commands) in &key_map.keys {
                if let Some(existing) = build.keys.get_mut(key) {
                    *existing = commands.clone();
                }
            }
        }
    }

    // Bindsets: per-key patches with null as the delete sentinel
    for (name, patch) in &modify.bindsets {
        let Some(bindset) = profile.bindsets.get_mut(name) else {
            continue;
        };
        if let Some(env_patch) = &patch.space {
            patch_bindset_keys(&mut bindset.space, env_patch);
        }
        if let Some(env_patch) = &patch.ground {
            patch_bindset_keys(&mut bindset.ground, env_patch);
        }
    }

    // Metadata: empty object clears the entry, non-empty merges into it
    for (env, entries) in &modify.keybind_metadata {
        let env_metadata = profile.keybind_metadata.entry(*env).or_default();
        for (key, entry) in entries {
            merge_metadata_entry(env_metadata, key, entry);
        }
    }
    for (name, entry) in &modify.alias_metadata {
        merge_metadata_entry(&mut profile.alias_metadata, name, entry);
    }
    for (bindset, envs) in &modify.bindset_metadata {
        let per_bindset = profile.bindset_metadata.entry(bindset.clone()).or_default();
        for (env, entries) in envs {
            let per_env = per_bindset.entry(*env).or_default();
            for (key, entry) in entries {
                merge_metadata_entry(per_env, key, entry);
            }
        }
    }
}

fn patch_bindset_keys(key_map: &mut KeyMap, patch: &BindsetKeyPatch) {
    for (key, commands) in &patch.keys {
        match commands {
            Some(commands) => {
                key_map.keys.insert(key.clone(), commands.clone());
            }
            None => {
                key_map.keys.remove(key);
            }
        }
    }
}

fn merge_metadata_entry(
    map: &mut std::collections::BTreeMap<String, MetadataEntry>,
    key: &str,
    entry: &MetadataEntry,
) {
    if entry.is_empty() {
        map.remove(key);
    } else {
        let target = map.entry(key.to_string()).or_default();
        for (field, value) in entry {
            target.insert(field.clone(), value.clone());
        }
    }
}

fn apply_properties(profile: &mut Profile, properties: &ProfileProperties) {
    if let Some(name) = &properties.name {
        profile.name = name.clone();
    }
    if let Some(description) = &properties.description {
        profile.description = description.clone();
    }
    if let Some(environment) = properties.current_environment {
        profile.current_environment = environment;
    }
}

//! Explicit-operations update payload
//!
//! All structural profile mutation goes through one discriminated payload
//! with four optional sections, applied in a fixed order: delete, add,
//! modify, properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::profile::{Alias, Bindset, Environment, KeyMap, MetadataEntry};

/// The `{add, delete, modify, properties}` structured update payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<AddOps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<DeleteOps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify: Option<ModifyOps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ProfileProperties>,
    /// Free-form tag for listeners that react selectively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_source: Option<String>,
}

impl ProfileUpdates {
    /// True when none of the four operation sections is present
    pub fn is_empty(&self) -> bool {
        self.add.is_none() && self.delete.is_none() && self.modify.is_none() && self.properties.is_none()
    }

    /// True when at least one structural section (add/delete/modify) is
    /// present; pure properties updates do not broadcast
    pub fn has_structural_ops(&self) -> bool {
        self.add.is_some() || self.delete.is_some() || self.modify.is_some()
    }
}

/// Named key list inside a delete section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyNameList {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Entries to remove; missing entries are no-ops
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteOps {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub builds: BTreeMap<Environment, KeyNameList>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindsets: Vec<String>,
}

/// Entries to union into the existing maps
///
/// On a name collision the new entry overwrites the existing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddOps {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, Alias>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub builds: BTreeMap<Environment, KeyMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindsets: BTreeMap<String, Bindset>,
}

/// Field patch for an existing alias
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Key patches for one bindset environment
///
/// A `null` command list is the delete sentinel for that key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindsetKeyPatch {
    #[serde(default)]
    pub keys: BTreeMap<String, Option<Vec<String>>>,
}

/// Patch for an existing bindset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindsetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<BindsetKeyPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground: Option<BindsetKeyPatch>,
}

/// Updates for entries that already exist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyOps {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, AliasPatch>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub builds: BTreeMap<Environment, KeyMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindsets: BTreeMap<String, BindsetPatch>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keybind_metadata: BTreeMap<Environment, BTreeMap<String, MetadataEntry>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alias_metadata: BTreeMap<String, MetadataEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindset_metadata: BTreeMap<String, BTreeMap<Environment, BTreeMap<String, MetadataEntry>>>,
}

/// Flat last-write-wins merge onto a profile's top-level fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_environment: Option<Environment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payload_detection() {
        let updates = ProfileUpdates::default();
        assert!(updates.is_empty());
        assert!(!updates.has_structural_ops());

        let props_only = ProfileUpdates {
            properties: Some(ProfileProperties {
                description: Some("d".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!props_only.is_empty());
        assert!(!props_only.has_structural_ops());

        let with_add = ProfileUpdates {
            add: Some(AddOps::default()),
            ..Default::default()
        };
        assert!(with_add.has_structural_ops());
    }

    #[test]
    fn test_null_sentinel_deserializes_to_none() {
        let patch: BindsetKeyPatch = serde_json::from_value(json!({
            "keys": { "F1": null, "F2": ["FireAll"] }
        }))
        .unwrap();

        assert_eq!(patch.keys["F1"], None);
        assert_eq!(patch.keys["F2"], Some(vec!["FireAll".to_string()]));
    }

    #[test]
    fn test_updates_payload_wire_shape() {
        let updates: ProfileUpdates = serde_json::from_value(json!({
            "delete": { "aliases": ["old"] },
            "add": { "aliases": { "fresh": { "commands": "FireAll" } } },
            "updateSource": "AliasBrowser"
        }))
        .unwrap();

        assert_eq!(updates.delete.as_ref().unwrap().aliases, vec!["old"]);
        assert!(updates.add.as_ref().unwrap().aliases.contains_key("fresh"));
        assert_eq!(updates.update_source.as_deref(), Some("AliasBrowser"));
    }
}

//! Profile documents: keybinds per environment, aliases, bindsets

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Per-entry annotation object (e.g. stabilization flags)
///
/// An empty object present for an entry means "clear this entry's metadata".
pub type MetadataEntry = Map<String, Value>;

/// Named configuration context within a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Space,
    Ground,
    Alias,
}

impl Environment {
    /// Parse an environment name as it arrives over the RPC surface
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "space" => Some(Self::Space),
            "ground" => Some(Self::Ground),
            "alias" => Some(Self::Alias),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Space => "space",
            Self::Ground => "ground",
            Self::Alias => "alias",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key name to ordered command sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMap {
    #[serde(default)]
    pub keys: BTreeMap<String, Vec<String>>,
}

/// Command alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub commands: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Named alternate keybind set overlaying the primary bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindset {
    #[serde(default)]
    pub space: KeyMap,
    #[serde(default)]
    pub ground: KeyMap,
}

impl Bindset {
    /// The keymap for one environment; `alias` has no keybinds
    pub fn environment(&self, env: Environment) -> Option<&KeyMap> {
        match env {
            Environment::Space => Some(&self.space),
            Environment::Ground => Some(&self.ground),
            Environment::Alias => None,
        }
    }

    pub fn environment_mut(&mut self, env: Environment) -> Option<&mut KeyMap> {
        match env {
            Environment::Space => Some(&mut self.space),
            Environment::Ground => Some(&mut self.ground),
            Environment::Alias => None,
        }
    }
}

/// Display name of the implicit primary bindset
///
/// The primary bindset is never stored as a named entry; it is the profile's
/// `builds` itself.
pub const PRIMARY_BINDSET: &str = "Primary Bindset";

/// Active-bindset selector
///
/// Modeled as a tagged variant instead of special-casing the primary's
/// display name throughout the overlay logic. On the wire it is the plain
/// bindset name string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BindsetSelector {
    #[default]
    Primary,
    Named(String),
}

impl BindsetSelector {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Primary => PRIMARY_BINDSET,
            Self::Named(name) => name,
        }
    }
}

impl From<String> for BindsetSelector {
    fn from(name: String) -> Self {
        if name == PRIMARY_BINDSET {
            Self::Primary
        } else {
            Self::Named(name)
        }
    }
}

impl From<BindsetSelector> for String {
    fn from(selector: BindsetSelector) -> Self {
        selector.as_str().to_string()
    }
}

fn default_environment() -> Environment {
    Environment::Space
}

/// A named configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_environment")]
    pub current_environment: Environment,
    #[serde(default)]
    pub builds: BTreeMap<Environment, KeyMap>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Alias>,
    #[serde(default)]
    pub bindsets: BTreeMap<String, Bindset>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keybind_metadata: BTreeMap<Environment, BTreeMap<String, MetadataEntry>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alias_metadata: BTreeMap<String, MetadataEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindset_metadata: BTreeMap<String, BTreeMap<Environment, BTreeMap<String, MetadataEntry>>>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
}

impl Profile {
    /// Create an empty profile with initialized space/ground builds
    pub fn new(name: impl Into<String>, description: impl Into<String>, mode: Environment) -> Self {
        let now = Utc::now();
        let mut profile = Self {
            name: name.into(),
            description: description.into(),
            current_environment: mode,
            builds: BTreeMap::new(),
            aliases: BTreeMap::new(),
            bindsets: BTreeMap::new(),
            keybind_metadata: BTreeMap::new(),
            alias_metadata: BTreeMap::new(),
            bindset_metadata: BTreeMap::new(),
            created: now,
            last_modified: now,
        };
        profile.ensure_build_environments();
        profile
    }

    /// Lazily create the `space` and `ground` build entries
    ///
    /// Idempotent repair: call sites rely on the post-condition that both
    /// entries exist afterwards.
    pub fn ensure_build_environments(&mut self) {
        self.builds.entry(Environment::Space).or_default();
        self.builds.entry(Environment::Ground).or_default();
    }

    /// Bump the modification timestamp
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}

/// Derive a profile id from its display name
///
/// Lowercase, non-alphanumerics stripped, whitespace runs collapsed to
/// underscores, truncated to 50 chars.
pub fn derive_profile_id(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let id = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let id: String = id.chars().take(50).collect();
    debug!(%name, %id, "derive_profile_id");
    id
}

/// Read-only projection of a profile flattened to one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub environment: Environment,
    #[serde(default)]
    pub keys: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Alias>,
    #[serde(default)]
    pub bindsets: BTreeMap<String, Bindset>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keybind_metadata: BTreeMap<Environment, BTreeMap<String, MetadataEntry>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alias_metadata: BTreeMap<String, MetadataEntry>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// Build the virtual profile for one environment
///
/// Pure projection apart from the documented side effect: missing build
/// environments are lazily created on the source profile so that
/// `builds.space` / `builds.ground` exist afterwards.
pub fn build_virtual_profile(id: &str, profile: &mut Profile, environment: Environment) -> VirtualProfile {
    profile.ensure_build_environments();
    let keys = profile
        .builds
        .get(&environment)
        .map(|build| build.keys.clone())
        .unwrap_or_default();

    VirtualProfile {
        id: id.to_string(),
        name: profile.name.clone(),
        description: profile.description.clone(),
        environment,
        keys,
        aliases: profile.aliases.clone(),
        bindsets: profile.bindsets.clone(),
        keybind_metadata: profile.keybind_metadata.clone(),
        alias_metadata: profile.alias_metadata.clone(),
        created: profile.created,
        last_modified: profile.last_modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_profile_id() {
        assert_eq!(derive_profile_id("My Profile"), "my_profile");
        assert_eq!(derive_profile_id("  Tactical   Escort! "), "tactical_escort");
        assert_eq!(derive_profile_id("123 ABC def"), "123_abc_def");
        assert_eq!(derive_profile_id("###"), "");

        let long = "x".repeat(80);
        assert_eq!(derive_profile_id(&long).len(), 50);
    }

    #[test]
    fn test_new_profile_has_both_environments() {
        let profile = Profile::new("Test", "", Environment::Space);
        assert!(profile.builds.contains_key(&Environment::Space));
        assert!(profile.builds.contains_key(&Environment::Ground));
    }

    #[test]
    fn test_virtual_profile_repair_is_idempotent() {
        let mut profile = Profile::new("Test", "", Environment::Space);
        profile.builds.clear();

        let first = build_virtual_profile("test", &mut profile, Environment::Space);
        let second = build_virtual_profile("test", &mut profile, Environment::Space);

        assert!(profile.builds.contains_key(&Environment::Space));
        assert!(profile.builds.contains_key(&Environment::Ground));
        assert_eq!(first.keys, second.keys);
        assert_eq!(profile.builds.len(), 2);
    }

    #[test]
    fn test_virtual_profile_flattens_environment_keys() {
        let mut profile = Profile::new("Test", "", Environment::Space);
        profile
            .builds
            .get_mut(&Environment::Space)
            .unwrap()
            .keys
            .insert("F1".to_string(), vec!["FireAll".to_string()]);

        let virtual_profile = build_virtual_profile("test", &mut profile, Environment::Space);
        assert_eq!(virtual_profile.environment, Environment::Space);
        assert_eq!(virtual_profile.keys["F1"], vec!["FireAll".to_string()]);

        let ground = build_virtual_profile("test", &mut profile, Environment::Ground);
        assert!(ground.keys.is_empty());
    }

    #[test]
    fn test_bindset_selector_wire_format() {
        let primary: BindsetSelector = serde_json::from_value(json!("Primary Bindset")).unwrap();
        assert_eq!(primary, BindsetSelector::Primary);

        let named: BindsetSelector = serde_json::from_value(json!("Alt Layout")).unwrap();
        assert_eq!(named, BindsetSelector::Named("Alt Layout".to_string()));

        assert_eq!(serde_json::to_value(&BindsetSelector::Primary).unwrap(), json!("Primary Bindset"));
    }

    #[test]
    fn test_profile_document_shape() {
        let profile = Profile::new("My Ship", "desc", Environment::Ground);
        let doc = serde_json::to_value(&profile).unwrap();

        assert_eq!(doc["name"], "My Ship");
        assert_eq!(doc["currentEnvironment"], "ground");
        assert!(doc["builds"]["space"]["keys"].is_object());
        assert!(doc["lastModified"].is_string());
        // Empty metadata maps stay out of the document
        assert!(doc.get("keybindMetadata").is_none());
    }

    #[test]
    fn test_profile_roundtrip_through_document() {
        let mut profile = Profile::new("Round Trip", "d", Environment::Space);
        profile.aliases.insert(
            "attack".to_string(),
            Alias {
                commands: "FireAll".to_string(),
                description: Some("spike".to_string()),
            },
        );
        profile
            .bindsets
            .entry("Alt".to_string())
            .or_default()
            .space
            .keys
            .insert("F1".to_string(), vec!["FirePhasers".to_string()]);

        let doc = serde_json::to_value(&profile).unwrap();
        let back: Profile = serde_json::from_value(doc).unwrap();
        assert_eq!(back, profile);
    }
}

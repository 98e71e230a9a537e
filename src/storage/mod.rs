//! Persistence collaborators
//!
//! The coordinator consumes storage through [`StorageBackend`] and always
//! awaits it. `get_all_data` returns the raw document so that normalization
//! can see legacy shapes before anything is typed.

mod file;
mod memory;

use async_trait::async_trait;
use eyre::Result;
use serde_json::{Map, Value};

use crate::domain::{AppState, Profile};

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Key-value persistence contract for the state document
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The full persisted document, if any
    async fn get_all_data(&self) -> Result<Option<Value>>;

    /// Replace the full persisted document
    async fn save_all_data(&self, state: &AppState) -> Result<()>;

    /// Write one profile into the persisted document
    async fn save_profile(&self, profile_id: &str, profile: &Profile) -> Result<()>;

    /// Remove one profile from the persisted document
    async fn delete_profile(&self, profile_id: &str) -> Result<()>;

    /// Replace the persisted settings map
    async fn save_settings(&self, settings: &Map<String, Value>) -> Result<()>;
}

/// Empty document skeleton for partial saves against fresh storage
pub(crate) fn empty_document() -> Value {
    serde_json::json!({
        "currentProfile": null,
        "currentEnvironment": "space",
        "profiles": {},
        "settings": {}
    })
}

/// Apply a partial mutation to a raw document, bumping `lastModified`
pub(crate) fn amend_document(doc: &mut Value, apply: impl FnOnce(&mut Map<String, Value>)) {
    if !doc.is_object() {
        *doc = empty_document();
    }
    if let Some(fields) = doc.as_object_mut() {
        apply(fields);
        fields.insert(
            "lastModified".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }
}

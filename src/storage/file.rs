//! File-backed storage: one JSON document on disk

use std::path::PathBuf;

use async_trait::async_trait;
use eyre::Result;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::debug;

use crate::domain::{AppState, Profile};

use super::{StorageBackend, amend_document, empty_document};

/// Stores the whole state document as pretty-printed JSON at one path
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "FileStorage::new");
        Self { path }
    }

    async fn read_document(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            debug!(path = ?self.path, "read_document: no document yet");
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn write_document(&self, doc: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(doc)?;
        fs::write(&self.path, content).await?;
        debug!(path = ?self.path, "write_document: document written");
        Ok(())
    }

    async fn amend(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let mut doc = self.read_document().await?.unwrap_or_else(empty_document);
        amend_document(&mut doc, apply);
        self.write_document(&doc).await
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get_all_data(&self) -> Result<Option<Value>> {
        self.read_document().await
    }

    async fn save_all_data(&self, state: &AppState) -> Result<()> {
        let doc = serde_json::to_value(state)?;
        self.write_document(&doc).await
    }

    async fn save_profile(&self, profile_id: &str, profile: &Profile) -> Result<()> {
        debug!(%profile_id, "FileStorage::save_profile");
        let value = serde_json::to_value(profile)?;
        let id = profile_id.to_string();
        self.amend(move |fields| {
            let profiles = fields
                .entry("profiles".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(profiles) = profiles.as_object_mut() {
                profiles.insert(id, value);
            }
        })
        .await
    }

    async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        debug!(%profile_id, "FileStorage::delete_profile");
        let id = profile_id.to_string();
        self.amend(move |fields| {
            if let Some(profiles) = fields.get_mut("profiles").and_then(Value::as_object_mut) {
                profiles.remove(&id);
            }
        })
        .await
    }

    async fn save_settings(&self, settings: &Map<String, Value>) -> Result<()> {
        debug!(count = settings.len(), "FileStorage::save_settings");
        let settings = settings.clone();
        self.amend(move |fields| {
            fields.insert("settings".to_string(), Value::Object(settings));
        })
        .await
    }
}

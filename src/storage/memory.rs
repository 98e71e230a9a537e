//! In-memory storage backend for tests and ephemeral sessions

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use eyre::{Result, eyre};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{AppState, Profile};

use super::{StorageBackend, amend_document, empty_document};

/// Holds the same document shape as [`super::FileStorage`], in memory
#[derive(Default)]
pub struct MemoryStorage {
    doc: Mutex<Option<Value>>,
    fail_next_save: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with an existing document
    pub fn with_document(doc: Value) -> Self {
        Self {
            doc: Mutex::new(Some(doc)),
            fail_next_save: AtomicBool::new(false),
        }
    }

    /// Make the next save operation fail (persist-failure tests)
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Current persisted document, for assertions
    pub fn document(&self) -> Option<Value> {
        self.doc.lock().expect("storage document poisoned").clone()
    }

    /// Replace the document out-of-band, simulating an external writer
    pub fn replace_document(&self, doc: Value) {
        *self.doc.lock().expect("storage document poisoned") = Some(doc);
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            debug!("MemoryStorage: injected save failure");
            return Err(eyre!("injected storage failure"));
        }
        Ok(())
    }

    fn amend(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        self.check_failure()?;
        let mut guard = self.doc.lock().expect("storage document poisoned");
        let mut doc = guard.take().unwrap_or_else(empty_document);
        amend_document(&mut doc, apply);
        *guard = Some(doc);
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get_all_data(&self) -> Result<Option<Value>> {
        Ok(self.document())
    }

    async fn save_all_data(&self, state: &AppState) -> Result<()> {
        self.check_failure()?;
        let doc = serde_json::to_value(state)?;
        *self.doc.lock().expect("storage document poisoned") = Some(doc);
        Ok(())
    }

    async fn save_profile(&self, profile_id: &str, profile: &Profile) -> Result<()> {
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
    }

    async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        let id = profile_id.to_string();
        self.amend(move |fields| {
            if let Some(profiles) = fields.get_mut("profiles").and_then(Value::as_object_mut) {
                profiles.remove(&id);
            }
        })
    }

    async fn save_settings(&self, settings: &Map<String, Value>) -> Result<()> {
        let settings = settings.clone();
        self.amend(move |fields| {
            fields.insert("settings".to_string(), Value::Object(settings));
        })
    }
}

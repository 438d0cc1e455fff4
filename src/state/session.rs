use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat key → value document persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl SessionDocument {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// JSON session file with an in-memory copy of its last contents.
pub struct SessionStore {
    path: PathBuf,
    data: RwLock<SessionDocument>,
    load_warning: Option<String>,
}

impl SessionStore {
    /// A missing file starts empty. A file that cannot be parsed also starts
    /// empty; the problem is kept in [`SessionStore::load_warning`].
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut load_warning = None;
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session state from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(doc) => doc,
                Err(err) => {
                    let message = format!("ignoring corrupt session file {}: {err}", path.display());
                    warn!("{message}");
                    load_warning = Some(message);
                    SessionDocument::default()
                }
            }
        } else {
            SessionDocument::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            load_warning,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    pub fn document(&self) -> SessionDocument {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stamp `doc` with the current time and write it out.
    pub fn save(&self, doc: &SessionDocument) -> Result<()> {
        let mut stamped = doc.clone();
        stamped.saved_at = Some(Utc::now());
        self.persist(&stamped)?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = stamped;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session state from {}", self.path.display()))?;
        let data: SessionDocument = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session state in {}", self.path.display()))?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        Ok(())
    }

    fn persist(&self, data: &SessionDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write session state to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("session.json");
        let store = SessionStore::new(path.clone()).unwrap();
        assert!(store.document().is_empty());

        let mut doc = SessionDocument::default();
        doc.insert("fpsPlayback", serde_json::json!(25.0));
        store.save(&doc).unwrap();

        let reopened = SessionStore::new(path).unwrap();
        let loaded = reopened.document();
        assert_eq!(loaded.get("fpsPlayback"), Some(&serde_json::json!(25.0)));
        assert!(loaded.saved_at.is_some());
    }

    #[test]
    fn corrupt_file_starts_empty_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{ not json").unwrap();
        let store = SessionStore::new(path).unwrap();
        assert!(store.document().is_empty());
        assert!(store.load_warning().is_some());
    }
}

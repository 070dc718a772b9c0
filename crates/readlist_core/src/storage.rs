//! Local persistent storage
//!
//! A small JSON key-value file, read once on open and rewritten on every change. Holds the
//! serialized session and UI preferences.
use crate::errors::StorageError;
use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Key of the serialized session (token + user profile).
pub const AUTH_KEY: &str = "auth";
/// Key of the dark-mode preference.
pub const DARK_MODE_KEY: &str = "darkMode";

pub struct LocalStore {
    /// Backing file, `None` for a purely in-memory store
    path: Option<PathBuf>,
    entries: RwLock<Map<String, Value>>,
}

impl LocalStore {
    /// Opens the store at `path`. A missing file yields an empty store; a file that is not a JSON
    /// object is ignored and overwritten on the next change.
    /// # Errors
    /// Fails if the file exists but cannot be read.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(path)?;
            match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("Ignoring unreadable local store at {}: {err}", path.display());
                    Map::new()
                }
            }
        } else {
            info!("No local store at {}, starting empty", path.display());
            Map::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(entries),
        })
    }

    #[must_use]
    #[inline]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(Map::new()),
        }
    }

    /// Reads and deserializes the value stored under `key`.
    /// # Errors
    /// Fails if the stored value does not have the expected shape.
    #[allow(clippy::missing_inline_in_public_items, reason = "Generic, called rarely")]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let entries = self.entries.read().map_err(|_poison| StorageError::Poisoned)?;
        entries
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(StorageError::from)
    }

    /// Stores `value` under `key` and writes the file.
    /// # Errors
    /// Fails if the value cannot be serialized or the file cannot be written.
    #[allow(clippy::missing_inline_in_public_items, reason = "Generic, called rarely")]
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.write().map_err(|_poison| StorageError::Poisoned)?;
        entries.insert(key.to_owned(), value);
        self.persist(&entries)
    }

    /// Removes `key`, writing the file if anything changed.
    /// # Errors
    /// Fails if the file cannot be written.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_poison| StorageError::Poisoned)?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // the store file is only ever replaced whole
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.get::<bool>(DARK_MODE_KEY).unwrap(), None);
        store.set(DARK_MODE_KEY, &true).unwrap();
        store.set("name", &"reader").unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.get::<bool>(DARK_MODE_KEY).unwrap(), Some(true));
        assert_eq!(
            reopened.get::<String>("name").unwrap(),
            Some(String::from("reader"))
        );
    }

    #[test]
    fn remove_deletes_persisted_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = LocalStore::open(&path).unwrap();
        store.set(AUTH_KEY, &"token").unwrap();
        store.remove(AUTH_KEY).unwrap();
        store.remove(AUTH_KEY).unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.get::<String>(AUTH_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json at all").unwrap();
        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.get::<bool>(DARK_MODE_KEY).unwrap(), None);
    }

    #[test]
    fn mismatched_type_is_an_error() {
        let store = LocalStore::in_memory();
        store.set(DARK_MODE_KEY, &"yes").unwrap();
        assert!(matches!(
            store.get::<bool>(DARK_MODE_KEY),
            Err(StorageError::Serde(_))
        ));
    }
}

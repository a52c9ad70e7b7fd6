//! Durable key/value storage for client state.
//!
//! Records are JSON strings keyed by name. Reads fall back to a caller
//! supplied value when a record is missing or no longer deserializes;
//! writes that fail are logged and otherwise ignored so the in-memory state
//! keeps working when the disk does not.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

pub const SESSIONS_KEY: &str = "chat-sessions";
pub const CURRENT_SESSION_KEY: &str = "current-session-id";
pub const SETTINGS_KEY: &str = "chat-settings";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait StateStore: Send + Sync {
    fn load_raw(&self, key: &str) -> Option<String>;

    fn save_raw(&self, key: &str, value: String) -> Result<(), StoreError>;

    fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T
    where
        Self: Sized,
    {
        let Some(raw) = self.load_raw(key) else {
            debug!(key, "no stored record, using fallback");
            return fallback;
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "stored record no longer matches its shape, using fallback");
                fallback
            }
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T)
    where
        Self: Sized,
    {
        let result = serde_json::to_string(value)
            .map_err(StoreError::from)
            .and_then(|raw| self.save_raw(key, raw));

        if let Err(e) = result {
            warn!(key, error = %e, "failed to persist record");
        }
    }
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn load_raw(&self, key: &str) -> Option<String> {
        (**self).load_raw(key)
    }

    fn save_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        (**self).save_raw(key, value)
    }
}

/// Process-local store, used for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn save_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// One `<key>.json` file per record inside a state directory.
///
/// The directory is read once at open; afterwards reads are served from the
/// cache, which every write updates before touching the disk.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut cache = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(raw) => {
                    cache.insert(key.to_string(), raw);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }

        debug!(dir = %dir.display(), records = cache.len(), "opened state directory");

        Ok(Self {
            dir,
            cache: Mutex::new(cache),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl StateStore for FileStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn save_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());

        let path = self.record_path(key);
        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_memory_store_get_fallback_and_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing", 7u32), 7);

        store.set("sample", &Sample { name: "a".into(), count: 2 });
        let loaded: Option<Sample> = store.get("sample", None);
        assert_eq!(loaded, Some(Sample { name: "a".into(), count: 2 }));
    }

    #[test]
    fn test_shape_mismatch_returns_fallback() {
        let store = MemoryStore::new();
        store.save_raw("sample", r#"{"unexpected": true}"#.to_string()).unwrap();
        let loaded = store.get("sample", Sample { name: "fallback".into(), count: 0 });
        assert_eq!(loaded.name, "fallback");

        store.save_raw("sample", "not json at all".to_string()).unwrap();
        assert_eq!(store.get("sample", 3u8), 3);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set(SETTINGS_KEY, &Sample { name: "persisted".into(), count: 9 });
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        let loaded: Option<Sample> = reopened.get(SETTINGS_KEY, None);
        assert_eq!(loaded, Some(Sample { name: "persisted".into(), count: 9 }));
        assert!(dir.path().join("chat-settings.json").exists());
        assert!(!dir.path().join("chat-settings.json.tmp").exists());
    }

    #[test]
    fn test_file_store_replaces_record_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state")).unwrap();
        assert_eq!(store.dir(), dir.path().join("state"));

        store.save_raw(SESSIONS_KEY, "[1]".to_string()).unwrap();
        store.save_raw(SESSIONS_KEY, "[1,2]".to_string()).unwrap();

        let on_disk = fs::read_to_string(store.dir().join("chat-sessions.json")).unwrap();
        assert_eq!(on_disk, "[1,2]");
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_file_store_write_failure_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let store = FileStore::open(&state_dir).unwrap();
        fs::remove_dir_all(&state_dir).unwrap();

        assert!(store.save_raw("k", "1".to_string()).is_err());
        // The typed setter swallows the same failure and the cache still serves it.
        store.set("k", &5u32);
        assert_eq!(store.get("k", 0u32), 5);
    }

    #[test]
    fn test_file_store_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.load_raw("notes").is_none());
    }
}

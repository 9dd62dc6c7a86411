//! JSON-file backed storage.

use crate::{KeyValueStore, StorageError, StorageResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Durable store persisted as one JSON object of string values.
///
/// Writes go to a sibling temp file that is renamed over the existing file, so a
/// reader never sees a half-written file and multi-key writes land together.
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<Map<String, Value>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StorageError::Encoding(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(StorageError::Encoding(e.to_string())),
        }
    }

    /// Current contents for a write; an unreadable file is replaced.
    fn read_for_update(&self) -> StorageResult<Map<String, Value>> {
        match self.read_all() {
            Err(StorageError::Encoding(e)) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable storage file");
                Ok(Map::new())
            }
            other => other,
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(map)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut Map<String, Value>) -> T) -> StorageResult<T> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut map = self.read_for_update()?;
        let result = f(&mut map);
        self.write_all(&map)?;
        Ok(result)
    }
}

impl KeyValueStore for FileStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(key = %key, "Setting value");
        self.update(|map| {
            map.insert(key.to_string(), Value::String(value.to_string()));
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.read_all()?.remove(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(StorageError::Encoding(format!(
                "value for {} is not a string: {}",
                key, other
            ))),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(key = %key, "Deleting value");
        self.update(|map| map.remove(key).is_some())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert(key.to_string(), Value::String(value.to_string()));
            }
        })
    }

    fn delete_many(&self, keys: &[&str]) -> StorageResult<usize> {
        self.update(|map| keys.iter().filter(|key| map.remove(**key).is_some()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_operations() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("storage.json"));

        assert_eq!(store.get("token").unwrap(), None);

        store.set("token", "abc").unwrap();
        assert_eq!(store.get("token").unwrap(), Some("abc".to_string()));
        assert!(store.has("token").unwrap());

        store.set("token", "def").unwrap();
        assert_eq!(store.get("token").unwrap(), Some("def".to_string()));

        assert!(store.delete("token").unwrap());
        assert!(!store.delete("token").unwrap());
        assert!(!store.has("token").unwrap());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        FileStore::new(&path)
            .set_many(&[("token", "t"), ("user", "{}")])
            .unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("token").unwrap(), Some("t".to_string()));
        assert_eq!(reopened.get("user").unwrap(), Some("{}".to_string()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_delete_many_counts_existing() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("storage.json"));
        store.set("token", "t").unwrap();

        assert_eq!(store.delete_many(&["token", "user"]).unwrap(), 1);
        assert_eq!(store.get("token").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_reads_as_error_and_is_replaced_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileStore::new(&path);

        assert!(matches!(store.get("token"), Err(StorageError::Encoding(_))));

        assert_eq!(store.delete_many(&["token", "user"]).unwrap(), 0);
        assert_eq!(store.get("token").unwrap(), None);
    }

    #[test]
    fn test_non_string_value_is_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"token": 42}"#).unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("token"), Err(StorageError::Encoding(_))));
    }
}

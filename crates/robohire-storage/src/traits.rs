//! Storage trait definitions.

use crate::StorageResult;
use std::sync::Arc;

/// A durable string key-value namespace.
///
/// Single-key operations are atomic. Backends that can write several keys in
/// one step override [`set_many`](KeyValueStore::set_many) and
/// [`delete_many`](KeyValueStore::delete_many).
pub trait KeyValueStore: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value, returning whether it existed
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Store several values.
    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Delete several keys, returning how many existed.
    fn delete_many(&self, keys: &[&str]) -> StorageResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        (**self).delete(key)
    }

    fn has(&self, key: &str) -> StorageResult<bool> {
        (**self).has(key)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        (**self).set_many(entries)
    }

    fn delete_many(&self, keys: &[&str]) -> StorageResult<usize> {
        (**self).delete_many(keys)
    }
}

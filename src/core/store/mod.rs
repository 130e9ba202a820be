//! Namespaced string key-value storage
//!
//! The persistent tier of the key cache talks to storage only through
//! [`KeyValueStore`]. Two implementations ship with the crate:
//!
//! - [`MemoryStore`] - process-local, for tests and ephemeral use
//! - [`FileStore`] - one JSON document per namespace on disk

mod file;

pub use file::FileStore;

use crate::error::Result;
use ahash::AHashMap;
use parking_lot::RwLock;

/// Namespaced string key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Deleting a missing key is not an error
    fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    fn keys(&self, namespace: &str) -> Result<Vec<String>>;

    /// Remove every key in the namespace
    fn clear(&self, namespace: &str) -> Result<()> {
        for key in self.keys(namespace)? {
            self.delete(namespace, &key)?;
        }
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<AHashMap<String, AHashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in a namespace
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key).cloned()))
    }

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        if let Some(ns) = self.namespaces.write().get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }
}

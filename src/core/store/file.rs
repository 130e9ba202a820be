//! JSON-file backed key-value store
//!
//! Each namespace lives in `<root>/<namespace>.json` as a flat string map.
//! Namespaces are loaded on first use and rewritten atomically (temp file +
//! rename) on every mutation.

use super::KeyValueStore;
use crate::error::{Result, SpoolTagError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type Namespace = BTreeMap<String, String>;

/// Directory of per-namespace JSON documents
pub struct FileStore {
    root: PathBuf,
    loaded: Mutex<HashMap<String, Namespace>>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!("Opened file store at {:?}", root);
        Ok(FileStore {
            root,
            loaded: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, namespace: &str) -> Result<PathBuf> {
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !namespace.starts_with('.');
        if !valid {
            return Err(SpoolTagError::Store(format!(
                "invalid namespace '{}': use letters, digits, '_', '-', '.'",
                namespace
            )));
        }
        Ok(self.root.join(format!("{}.json", namespace)))
    }

    /// Run `f` against a loaded namespace, persisting if it reports a change
    fn with_namespace<R>(
        &self,
        namespace: &str,
        f: impl FnOnce(&mut Namespace) -> (R, bool),
    ) -> Result<R> {
        let path = self.path_for(namespace)?;
        let mut loaded = self.loaded.lock();

        if !loaded.contains_key(namespace) {
            let map = Self::read_namespace(&path);
            loaded.insert(namespace.to_string(), map);
        }

        let map = loaded
            .get_mut(namespace)
            .ok_or_else(|| SpoolTagError::Store(format!("namespace '{}' not loaded", namespace)))?;

        let (result, changed) = f(map);
        if changed {
            Self::write_namespace(&path, map)?;
        }
        Ok(result)
    }

    fn read_namespace(path: &Path) -> Namespace {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Namespace::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("Discarding unreadable store file {:?}: {}", path, e);
                Namespace::new()
            }
        }
    }

    fn write_namespace(path: &Path, map: &Namespace) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string(map)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        self.with_namespace(namespace, |map| (map.get(key).cloned(), false))
    }

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.with_namespace(namespace, |map| {
            map.insert(key.to_string(), value.to_string());
            ((), true)
        })
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.with_namespace(namespace, |map| {
            let removed = map.remove(key).is_some();
            ((), removed)
        })
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        self.with_namespace(namespace, |map| (map.keys().cloned().collect(), false))
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        self.with_namespace(namespace, |map| {
            let changed = !map.is_empty();
            map.clear();
            ((), changed)
        })
    }
}

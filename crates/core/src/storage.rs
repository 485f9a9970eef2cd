//! Key-value storage abstraction — the host supplies a persistent store for
//! client and session identifiers. Implementations must be infallible to
//! construct; individual operations may fail and callers decide whether a
//! failure is fatal (identity treats it as a silent fallback to volatile ids).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{OmniError, OmniResult};

/// Persistent string key-value store provided by the host.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> OmniResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> OmniResult<()>;
    fn remove(&self, key: &str) -> OmniResult<()>;
}

/// Volatile in-process store. The default when the host provides nothing.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> OmniResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> OmniResult<()> {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> OmniResult<()> {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .remove(key);
        Ok(())
    }
}

/// Convenience: fresh volatile store.
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// JSON-file-backed store for long-lived host processes. The whole map is
/// rewritten on every mutation; identity traffic is two keys, so this stays
/// cheap.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> OmniResult<Self> {
        let path = path.into();
        let cache = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| OmniError::Storage(format!("corrupt store file: {e}")))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> OmniResult<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> OmniResult<Option<String>> {
        Ok(self
            .cache
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> OmniResult<()> {
        let mut entries = self.cache.lock().expect("store mutex poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> OmniResult<()> {
        let mut entries = self.cache.lock().expect("store mutex poisoned");
        entries.remove(key);
        self.persist(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".into()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("omni-store-{}.json", Uuid::new_v4()));

        {
            let store = FileStore::open(&path).unwrap();
            store.set("omni_client_id", "anon-42").unwrap();
        }
        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.get("omni_client_id").unwrap(), Some("anon-42".into()));
            store.remove("omni_client_id").unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("omni_client_id").unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }
}

//! Document store backends.
//!
//! Records are JSON documents addressed by string keys (`user:<id>`,
//! `post:<id>`, ...). The [`KvStore`] trait is the seam between the record
//! stores and the persistence backend; [`MemoryStore`] keeps everything in
//! process and [`FileStore`] additionally mirrors every write to a JSON file.

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use crate::users::Users;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key already exists: {0}")]
    Conflict(String),
    #[error("corrupt document at {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Stores `value` only if `key` is vacant, atomically with respect to
    /// every other write. Returns false when the key was already taken.
    fn insert_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError>;

    /// All documents whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

/// Typed access on top of any [`KvStore`].
pub trait KvStoreExt: KvStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.set(key, serde_json::to_value(value)?)
    }

    fn insert_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, StoreError> {
        self.insert_if_absent(key, serde_json::to_value(value)?)
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        self.scan_prefix(prefix)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_value(value).map_err(|source| StoreError::Decode { key, source })
            })
            .collect()
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

type Entries = BTreeMap<String, Value>;

fn scan(entries: &Entries, prefix: &str) -> Vec<(String, Value)> {
    entries
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn insert_vacant(entries: &mut Entries, key: &str, value: Value) -> bool {
    if entries.contains_key(key) {
        return false;
    }
    entries.insert(key.to_string(), value);
    true
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn insert_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        Ok(insert_vacant(&mut entries, key, value))
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(scan(&entries, prefix))
    }
}

/// In-memory map that rewrites `path` after every mutation.
///
/// The file is written to a sibling `.tmp` file and renamed into place while
/// the write lock is held, so the on-disk copy always reflects a complete
/// state in write order.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<Entries>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read data file {}", path.display()))?;
            if raw.trim().is_empty() {
                Entries::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse data file {}", path.display()))?
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            Entries::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&tmp, data)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn write<R>(&self, f: impl FnOnce(&mut Entries) -> R) -> Result<R, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        // Memory only changes once the new state is on disk.
        let mut next = entries.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(out)
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.write(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.write(|entries| entries.remove(key).is_some())
    }

    fn insert_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        self.write(|entries| insert_vacant(entries, key, value))
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(scan(&entries, prefix))
    }
}

/// Creates the configured admin account unless the username is taken.
/// Returns whether a user was created.
pub fn init_admin_user(users: &Users, username: &str, password: &str) -> anyhow::Result<bool> {
    if users.find_by_username(username)?.is_some() {
        return Ok(false);
    }

    let hash = crate::core::helpers::hash_password(password)?;
    match users.create(username, &hash) {
        Ok(_) => Ok(true),
        // Lost a race with a registration for the same name.
        Err(StoreError::Conflict(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn temp_file() -> PathBuf {
        std::env::temp_dir()
            .join(format!("quill-db-{}", uuid::Uuid::new_v4()))
            .join("data.json")
    }

    #[test]
    fn memory_get_set_delete() {
        let store = MemoryStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.set("a", json!({"x": 1})).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!({"x": 1})));

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn insert_if_absent_keeps_first_value() {
        let store = MemoryStore::new();
        assert!(store.insert_if_absent("k", json!("first")).unwrap());
        assert!(!store.insert_if_absent("k", json!("second")).unwrap());
        assert_eq!(store.get("k").unwrap(), Some(json!("first")));
    }

    #[test]
    fn concurrent_inserts_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.insert_if_absent("race", json!(i)).unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn scan_is_limited_to_prefix() {
        let store = MemoryStore::new();
        store.set("post:1", json!(1)).unwrap();
        store.set("post:2", json!(2)).unwrap();
        store.set("postal", json!(3)).unwrap();
        store.set("user:1", json!(4)).unwrap();

        let keys: Vec<String> = store
            .scan_prefix("post:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["post:1", "post:2"]);
    }

    #[test]
    fn typed_helpers_report_corrupt_documents() {
        let store = MemoryStore::new();
        store.set("n", json!("not a number")).unwrap();

        let err = store.get_json::<u32>("n").unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "n"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = temp_file();
        {
            let store = FileStore::open(&path).unwrap();
            store.set_json("user:1", &json!({"name": "a"})).unwrap();
            store.set_json("user:2", &json!({"name": "b"})).unwrap();
            store.delete("user:2").unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("user:1").unwrap(), Some(json!({"name": "a"})));
        assert!(reopened.get("user:2").unwrap().is_none());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn file_store_rejects_garbage() {
        let path = temp_file();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(FileStore::open(&path).is_err());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn failed_persist_leaves_memory_untouched() {
        let path = temp_file();
        let dir = path.parent().unwrap().to_path_buf();
        let store = Arc::new(FileStore::open(&path).unwrap());
        store.set("keep", json!(1)).unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(store.set("lost", json!(2)).is_err());
        assert!(store.get("lost").unwrap().is_none());

        let users = Users::new(store.clone());
        assert!(users.create("alice", "hash").is_err());
        assert!(store.get("username:alice").unwrap().is_none());

        // Once the disk is back the name can still be claimed.
        std::fs::create_dir_all(&dir).unwrap();
        let alice = users.create("alice", "hash").unwrap();
        assert_eq!(users.find_by_username("alice").unwrap().unwrap().id, alice.id);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("keep").unwrap(), Some(json!(1)));
        assert!(reopened.get("lost").unwrap().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn admin_seed_is_idempotent() {
        let users = Users::new(Arc::new(MemoryStore::new()));
        assert!(init_admin_user(&users, "admin", "secret").unwrap());
        assert!(!init_admin_user(&users, "admin", "other").unwrap());

        let admin = users.find_by_username("admin").unwrap().unwrap();
        assert!(crate::core::helpers::verify_password("secret", &admin.password_hash));
    }
}

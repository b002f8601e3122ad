//! Key/value persistence
//!
//! Values are opaque bytes; callers own the snapshot encoding. Backends are
//! shared across managers, so every operation takes `&self` and must be safe
//! under concurrent use.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use converge_types::{ConvergeError, Result};

/// Persistence interface with prefix scan and atomic put-if-absent
pub trait Store: Send + Sync {
    /// Store a value
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Retrieve a value; a missing key is not an error
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a value; deleting a missing key is a no-op
    fn delete(&self, key: &str) -> Result<()>;

    /// List keys starting with the prefix
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Store a value only if the key is absent; returns true when written
    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool>;
}

/// In-memory store backed by a mutex-guarded map
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        let mut data = self.data.lock();
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value);
        Ok(true)
    }
}

/// File-backed store, one file per key
///
/// Keys map directly to file names, so path separators are rejected.
/// `put_if_absent` relies on create-exclusive open for atomicity.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open a store rooted at the given directory, creating it if needed
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(ConvergeError::invalid_argument(format!(
                "store key is not a safe file name: {key:?}"
            )));
        }
        Ok(self.base_path.join(key))
    }
}

impl Store for FileStore {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        fs::write(self.path_for(key)?, value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(prefix) {
                keys.push(name.to_string());
            }
        }
        Ok(keys)
    }

    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&value)?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store(store: &dyn Store) {
        assert_eq!(store.get("task:1").unwrap(), None);
        store.put("task:1", b"one".to_vec()).unwrap();
        store.put("task:2", b"two".to_vec()).unwrap();
        store.put("pool:a", b"pool".to_vec()).unwrap();

        assert_eq!(store.get("task:1").unwrap(), Some(b"one".to_vec()));

        let mut tasks = store.list("task:").unwrap();
        tasks.sort();
        assert_eq!(tasks, vec!["task:1".to_string(), "task:2".to_string()]);

        assert!(!store.put_if_absent("task:1", b"other".to_vec()).unwrap());
        assert_eq!(store.get("task:1").unwrap(), Some(b"one".to_vec()));
        assert!(store.put_if_absent("task:3", b"three".to_vec()).unwrap());

        store.delete("task:1").unwrap();
        assert_eq!(store.get("task:1").unwrap(), None);
        // Double delete is a no-op.
        store.delete("task:1").unwrap();
    }

    #[test]
    fn test_memory_store() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).unwrap();
            store.put("task:persist", b"kept".to_vec()).unwrap();
        }
        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.get("task:persist").unwrap(), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_file_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.put("../escape", b"x".to_vec()).is_err());
        assert!(store.put("a/b", b"x".to_vec()).is_err());
    }
}

//! Key-value storage abstraction for persisted configuration.
//!
//! The core never talks to a concrete storage backend directly; callers hand
//! in whatever implements [`KeyValueStore`].

use super::error::{Result, SecurityError};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, `None` if the key is absent.
    ///
    /// # Errors
    /// Returns `SecurityError::Config` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns `SecurityError::Config` if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the key. Deleting an absent key is not an error.
    ///
    /// # Errors
    /// Returns `SecurityError::Config` if the backend cannot be written.
    fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Stores all keys in a single JSON object on disk.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous content intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "store file absent, starting empty");
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(SecurityError::Config(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&raw).map_err(|err| {
            SecurityError::Config(format!("malformed store {}: {err}", self.path.display()))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let body = serde_json::to_string_pretty(entries)
            .map_err(|err| SecurityError::Config(format!("failed to encode store: {err}")))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|err| {
            SecurityError::Config(format!("failed to write {}: {err}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            SecurityError::Config(format!("failed to replace {}: {err}", self.path.display()))
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

//! Durable key/value storage
//!
//! Backends for state that must outlive the in-memory stores. Two tiers are
//! available: [`StorageTier::Local`] survives restarts, while
//! [`StorageTier::Session`] only lives as long as the running game.
//!
//! Values are opaque strings; serialization is the caller's choice.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/// Durability class of a storage backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    /// Persists across process restarts
    #[default]
    Local,
    /// Persists only for the current session
    Session,
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the backing medium failed
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    /// Writing would exceed the backend's byte quota
    #[error("storage quota exceeded for '{key}': {requested} bytes requested, {available} available")]
    QuotaExceeded {
        key: String,
        requested: usize,
        available: usize,
    },
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// A durable string key/value backend
pub trait DurableStorage {
    /// Read the item at `key`, `None` if absent
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` at `key`
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the item at `key` if present
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Shared handle to a storage backend
pub type SharedStorage = Rc<dyn DurableStorage>;

/// In-memory storage with an optional byte quota
///
/// Used for the session tier, and for the local tier when no storage
/// directory is configured.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<FxHashMap<String, String>>,
    /// Maximum total bytes of keys and values
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage that rejects writes beyond `quota` bytes
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: RefCell::default(),
            quota: Some(quota),
        }
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.items
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl DurableStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            let requested = key.len() + value.len();
            let available = quota.saturating_sub(self.used_bytes_excluding(key));
            if requested > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available,
                });
            }
        }
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// File-backed storage, one file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open a storage directory, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are percent-escaped so every key maps
    /// to a distinct, portable file name.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

impl DurableStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Write through a sibling `.tmp` file and rename it over the item, so
    /// a crash mid-write never leaves a truncated item behind
    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let io_error = |source: io::Error| StorageError::Io {
            key: key.to_string(),
            source,
        };
        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");

        let mut file = File::create(&temp_path).map_err(io_error)?;
        file.write_all(value.as_bytes()).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(io_error)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

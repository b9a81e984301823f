//! Persisted key/value backends.
//!
//! The entity and index caches only need string keys mapped to string
//! values. [`MemoryStore`] keeps them in process; [`FileStore`] writes one
//! file per key so cached copies survive restarts.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Longest hex-encoded key used directly as a file name. Staging names add a
/// 32-character uuid and suffixes, and must stay under the 255-byte limit.
const MAX_HEX_NAME_LEN: usize = 160;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed cache entry `{key}`: {reason}")]
    Malformed { key: String, reason: String },
}

impl StoreError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// String-keyed, string-valued persisted store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove `key`; a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Durable store backed by a directory, one file per key.
///
/// Short keys are stored under the hex encoding of the key. Longer keys,
/// such as full index query strings, are stored under a SHA-256 digest of the
/// key, and the file holds the key next to the value so a read can confirm
/// it found the right entry.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

enum FileSlot {
    Plain(PathBuf),
    Hashed(PathBuf),
}

impl FileSlot {
    fn path(&self) -> &Path {
        match self {
            FileSlot::Plain(path) | FileSlot::Hashed(path) => path,
        }
    }
}

#[derive(Serialize)]
struct HashedEntryRef<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Deserialize)]
struct HashedEntry {
    key: String,
    value: String,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_for(&self, key: &str) -> FileSlot {
        let encoded = hex::encode(key);
        if encoded.len() <= MAX_HEX_NAME_LEN {
            return FileSlot::Plain(self.root.join(format!("{encoded}.json")));
        }
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hex::encode(hasher.finalize());
        FileSlot::Hashed(self.root.join(format!("sha256-{digest}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let slot = self.slot_for(key);
        let contents = match fs::read_to_string(slot.path()) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match slot {
            FileSlot::Plain(_) => Ok(Some(contents)),
            FileSlot::Hashed(_) => {
                let entry: HashedEntry = serde_json::from_str(&contents)
                    .map_err(|err| StoreError::malformed(key, err.to_string()))?;
                Ok((entry.key == key).then_some(entry.value))
            }
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let slot = self.slot_for(key);
        let contents = match slot {
            FileSlot::Plain(_) => value,
            FileSlot::Hashed(_) => serde_json::to_string(&HashedEntryRef {
                key,
                value: &value,
            })?,
        };
        let path = slot.path();
        let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&staging, contents)?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.slot_for(key).path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

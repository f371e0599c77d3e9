//! Local key-value storage
//!
//! The dashboard keeps every piece of client state as a JSON-encoded string
//! under a fixed key. This module provides that store as a trait with a
//! file-backed implementation (one `<key>.json` file per key) and an
//! in-memory one for tests and ephemeral sessions.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Ceiling on a single serialized value, in bytes
pub const MAX_DOCUMENT_BYTES: usize = 5_000_000;

/// Every key the client persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    /// Primary application state document
    AppState,
    /// Alias written by older dashboard builds
    LegacyAppState,
    /// Stable per-device user identifier
    UserId,
    /// Theme preference
    Theme,
    /// Live vitals snapshot overriding the document's vitals
    CurrentVitals,
    /// Task list written by older dashboard builds
    HealthTasks,
    /// Reports whose dispatch could not reach the server
    PendingReports,
    /// Bounded diagnostic event log
    AppEvents,
    /// Set once the status check has seen the server online
    ApiFirstConnect,
}

impl StorageKey {
    pub const ALL: [StorageKey; 9] = [
        StorageKey::AppState,
        StorageKey::LegacyAppState,
        StorageKey::UserId,
        StorageKey::Theme,
        StorageKey::CurrentVitals,
        StorageKey::HealthTasks,
        StorageKey::PendingReports,
        StorageKey::AppEvents,
        StorageKey::ApiFirstConnect,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            StorageKey::AppState => "compassAppState",
            StorageKey::LegacyAppState => "rpmCoachStateDistributed",
            StorageKey::UserId => "userId",
            StorageKey::Theme => "compassTheme",
            StorageKey::CurrentVitals => "currentVitals",
            StorageKey::HealthTasks => "healthTasks",
            StorageKey::PendingReports => "pendingReports",
            StorageKey::AppEvents => "appEvents",
            StorageKey::ApiFirstConnect => "apiFirstConnect",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded for '{key}': {size} bytes (limit {limit})")]
    #[diagnostic(
        code(compass_core::storage_quota),
        help("Could not save data. Please export your data and clear old entries")
    )]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("Storage {operation} failed for '{key}' at {}", .path.display())]
    #[diagnostic(
        code(compass_core::storage_io),
        help("Check that the data directory is readable and writable")
    )]
    Io {
        key: String,
        operation: &'static str,
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("Could not encode or decode '{key}'")]
    #[diagnostic(code(compass_core::storage_serialization))]
    Serialization {
        key: String,
        #[source]
        cause: serde_json::Error,
    },
}

/// Reject a value whose serialized size is over `limit`
pub fn ensure_within_quota(
    key: StorageKey,
    value: &str,
    limit: usize,
) -> Result<(), StorageError> {
    if value.len() > limit {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            size: value.len(),
            limit,
        });
    }
    Ok(())
}

/// String-valued local store, one value per [`StorageKey`]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;

    /// Write a value. Implementations must leave the previous value intact
    /// when the write is refused or fails.
    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;
}

/// Typed JSON access on top of any [`KeyValueStore`]
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_json<T: DeserializeOwned>(&self, key: StorageKey) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|cause| StorageError::Serialization {
                    key: key.to_string(),
                    cause,
                }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|cause| StorageError::Serialization {
            key: key.to_string(),
            cause,
        })?;
        self.set(key, &raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// In-memory store
#[derive(Debug)]
pub struct MemoryStore {
    values: RwLock<HashMap<StorageKey, String>>,
    max_value_bytes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_quota(MAX_DOCUMENT_BYTES)
    }

    pub fn with_quota(max_value_bytes: usize) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            max_value_bytes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        ensure_within_quota(key, value, self.max_value_bytes)?;
        self.values.write().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        self.values.write().remove(&key);
        Ok(())
    }
}

/// Directory-backed store: each key lives in `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    max_value_bytes: usize,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|cause| StorageError::Io {
            key: "<root>".to_string(),
            operation: "open",
            path: dir.clone(),
            cause,
        })?;
        tracing::debug!("Opened local store at {}", dir.display());
        Ok(Self {
            dir,
            max_value_bytes: MAX_DOCUMENT_BYTES,
        })
    }

    pub fn with_quota(mut self, max_value_bytes: usize) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: StorageKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(cause) => Err(StorageError::Io {
                key: key.to_string(),
                operation: "read",
                path,
                cause,
            }),
        }
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        ensure_within_quota(key, value, self.max_value_bytes)?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let io_err = |operation: &'static str, path: &Path, cause| StorageError::Io {
            key: key.to_string(),
            operation,
            path: path.to_path_buf(),
            cause,
        };

        // Write-then-rename so a failed write never leaves a truncated value behind
        fs::write(&tmp, value).map_err(|e| io_err("write", &tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_err("rename", &path, e)
        })?;
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(cause) => Err(StorageError::Io {
                key: key.to_string(),
                operation: "remove",
                path,
                cause,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_key_names_match_dashboard_keys() {
        assert_eq!(StorageKey::AppState.as_str(), "compassAppState");
        assert_eq!(
            StorageKey::LegacyAppState.to_string(),
            "rpmCoachStateDistributed"
        );
        assert_eq!(StorageKey::ALL.len(), 9);
    }

    #[test]
    fn test_memory_store_rejects_oversized_value_and_keeps_old_one() {
        let store = MemoryStore::with_quota(8);
        store.set(StorageKey::Theme, "\"neon\"").unwrap();

        let err = store.set(StorageKey::Theme, "\"much too long\"").unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded { size: 15, limit: 8, .. }
        ));
        assert_eq!(
            store.get(StorageKey::Theme).unwrap().as_deref(),
            Some("\"neon\"")
        );
    }

    #[test]
    fn test_file_store_roundtrip_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("data")).unwrap();

        assert_eq!(store.get(StorageKey::UserId).unwrap(), None);
        store.set_json(StorageKey::UserId, "user_1_abc").unwrap();
        let loaded: Option<String> = store.get_json(StorageKey::UserId).unwrap();
        assert_eq!(loaded.as_deref(), Some("user_1_abc"));
        assert!(dir.path().join("data").join("userId.json").exists());

        store.remove(StorageKey::UserId).unwrap();
        assert_eq!(store.get(StorageKey::UserId).unwrap(), None);
        // Removing twice is fine
        store.remove(StorageKey::UserId).unwrap();
    }

    #[test]
    fn test_file_store_quota_leaves_no_partial_write() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap().with_quota(16);
        store.set(StorageKey::AppEvents, "[]").unwrap();

        let big = format!("[\"{}\"]", "x".repeat(64));
        assert!(store.set(StorageKey::AppEvents, &big).is_err());
        assert_eq!(
            store.get(StorageKey::AppEvents).unwrap().as_deref(),
            Some("[]")
        );
        assert!(!dir.path().join("appEvents.json.tmp").exists());
    }

    #[test]
    fn test_get_json_reports_corrupt_value() {
        let store = MemoryStore::new();
        store.set(StorageKey::CurrentVitals, "{not json").unwrap();
        let result: Result<Option<serde_json::Value>, _> =
            store.get_json(StorageKey::CurrentVitals);
        assert!(matches!(result, Err(StorageError::Serialization { .. })));
    }
}

//! Key-value persistence contract.
//!
//! Everything the app remembers across reloads (points, threads, preferences)
//! goes through a synchronous, string-keyed store. Writes are best-effort:
//! callers log and carry on when a write fails.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Well-known keys
pub mod keys {
    pub const TOTAL_POINTS: &str = "totalPoints";
    pub const POINT_EVENTS: &str = "pointEvents";
    pub const CHAT_THREADS: &str = "chatThreads";
    pub const MOCK_THREADS: &str = "aichat_mock_threads";
    pub const LAST_LOGIN_DATE: &str = "lastLoginDate";
    pub const THEME_MODE: &str = "themeMode";
    pub const CONTENT_WIDTH: &str = "contentWidth";
    pub const CHAT_FONT_SIZE: &str = "chatFontSize";
    pub const INDICATOR_POSITION: &str = "indicatorPosition";
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage quota exceeded writing {key} ({needed} bytes, limit {limit})")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Synchronous string-keyed store scoped to one user/profile
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store, optionally with a byte quota over all keys and values.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the total size past `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn used_bytes(entries: &HashMap<String, String>, skip: &str) -> usize {
        entries
            .iter()
            .filter(|(k, _)| k.as_str() != skip)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        if let Some(limit) = self.quota {
            let needed = Self::used_bytes(&entries, key) + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Write `value` as JSON under `key`. Failures are logged and swallowed;
/// the in-memory copy stays authoritative. Returns whether the write landed.
pub fn mirror<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to encode value for storage");
            return false;
        }
    };
    match store.set(key, &json) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to persist value");
            false
        }
    }
}

/// Read and decode a JSON value. Missing, unreadable and corrupt entries all
/// yield `None`; the latter two are logged.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read stored value");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring corrupt stored value");
            None
        }
    }
}

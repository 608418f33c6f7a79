//! Persistent key-value storage for the chat session.
//!
//! [`KeyValueStore`] is the seam the rest of the client depends on:
//! - Web: `localStorage` ([`LocalStorage`])
//! - Desktop: JSON files in the platform config directory ([`FileStore`]):
//!   - Linux: `~/.config/wschat/`
//!   - macOS: `~/Library/Application Support/wschat/`
//!   - Windows: `%APPDATA%\wschat\`
//! - Tests: [`MemoryStore`]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use wschat_shared::{ChatMessage, StorageError};

/// String-keyed storage of string values.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str);
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Unavailable)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

// =========================================
// Web (WASM) implementation
// =========================================

/// Browser `localStorage`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    fn storage() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok()?
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        Self::storage()?.get_item(key).ok()?
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let storage = Self::storage().ok_or(StorageError::Unavailable)?;
        storage
            .set_item(key, value)
            .map_err(|e| StorageError::Write(format!("{:?}", e)))
    }

    fn remove(&mut self, key: &str) {
        if let Some(storage) = Self::storage() {
            let _ = storage.remove_item(key);
        }
    }
}

// =========================================
// Desktop (native) implementation
// =========================================

/// One JSON file per key inside a directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform config directory, creating it if needed.
    pub fn in_config_dir() -> Option<Self> {
        let app_dir = dirs::config_dir()?.join("wschat");
        if !app_dir.exists() {
            std::fs::create_dir_all(&app_dir).ok()?;
        }
        Some(Self::new(app_dir))
    }

    fn file_path(&self, key: &str) -> std::path::PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::write(self.file_path(key), value).map_err(|e| StorageError::Write(e.to_string()))
    }

    fn remove(&mut self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }
}

// =========================================
// Session record
// =========================================

/// What survives a restart: the local session id and recent messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub current_session_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Reads and writes the [`PersistedSession`] record under one key.
pub struct SessionPersistence {
    backend: Box<dyn KeyValueStore>,
    key: String,
    max_messages: usize,
}

impl SessionPersistence {
    pub fn new(
        backend: Box<dyn KeyValueStore>,
        key: impl Into<String>,
        max_messages: usize,
    ) -> Self {
        Self {
            backend,
            key: key.into(),
            max_messages,
        }
    }

    /// Load the stored session. Unreadable data is wiped and `None` returned.
    pub fn load(&mut self) -> Option<PersistedSession> {
        let raw = self.backend.get(&self.key)?;
        match serde_json::from_str::<PersistedSession>(&raw) {
            Ok(session) if !session.current_session_id.trim().is_empty() => Some(session),
            Ok(_) => {
                crate::log_warn!("Stored session has no id, resetting");
                self.clear();
                None
            }
            Err(e) => {
                crate::log_warn!("Stored session is unreadable ({}), resetting", e);
                self.clear();
                None
            }
        }
    }

    /// Write the session, keeping only the newest messages. Failures are logged.
    pub fn save(&mut self, session_id: &str, messages: &[ChatMessage]) {
        let start = messages.len().saturating_sub(self.max_messages);
        let record = PersistedSession {
            current_session_id: session_id.to_string(),
            messages: messages[start..].to_vec(),
        };
        let result = serde_json::to_string(&record)
            .map_err(|e| StorageError::Encode(e.to_string()))
            .and_then(|json| self.backend.set(&self.key, &json));
        if let Err(e) = result {
            crate::log_error!("Failed to persist session: {}", e);
        }
    }

    pub fn clear(&mut self) {
        self.backend.remove(&self.key);
    }
}

impl std::fmt::Debug for SessionPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPersistence")
            .field("key", &self.key)
            .field("max_messages", &self.max_messages)
            .finish_non_exhaustive()
    }
}

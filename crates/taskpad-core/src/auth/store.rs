//! Key-value persistence for the session token and cached user.
//!
//! Backends never fail outward: a storage problem is logged and the session
//! carries on as if the value were absent. Every `set`/`remove` writes
//! through immediately so a restart never sees older state than memory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

/// Key holding the bearer token.
pub const TOKEN_KEY: &str = "jwt_token";

/// Key holding the cached user record (JSON).
pub const USER_KEY: &str = "user_data";

/// Session file name in the cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name
const SERVICE_NAME: &str = "taskpad";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) {
        (**self).remove(key)
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.lock().remove(key);
    }
}

// ============================================================================
// File
// ============================================================================

/// All keys in one JSON object, `session.json` in the cache directory.
///
/// Nothing is cached in memory: every call reads the file again, so a login
/// or logout made by another process is seen on the next `get`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(SESSION_FILE);
        debug!(path = %path.display(), exists = path.exists(), "Session store opened");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    /// Current file contents. An unreadable file is logged and treated as
    /// empty.
    fn read_values(&self) -> BTreeMap<String, String> {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, path = %self.path.display(), "Ignoring unreadable session file");
            BTreeMap::new()
        })
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if values.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn persist(&self, values: &BTreeMap<String, String>) {
        if let Err(e) = self.save(values) {
            warn!(error = %e, path = %self.path.display(), "Failed to save session file");
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_values().remove(key)
    }

    fn set(&mut self, key: &str, value: &str) {
        let mut values = self.read_values();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values);
    }

    fn remove(&mut self, key: &str) {
        let mut values = self.read_values();
        if values.remove(key).is_some() {
            self.persist(&values);
        }
    }
}

// ============================================================================
// Keyring
// ============================================================================

/// OS keychain, one entry per key under the `taskpad` service.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry(key: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, key).context("Failed to create keyring entry")
    }

    fn try_get(key: &str) -> Result<Option<String>> {
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read from keychain"),
        }
    }

    fn try_set(key: &str, value: &str) -> Result<()> {
        Self::entry(key)?
            .set_password(value)
            .context("Failed to store value in keychain")
    }

    fn try_remove(key: &str) -> Result<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Option<String> {
        Self::try_get(key).unwrap_or_else(|e| {
            warn!(error = %e, key, "Keychain read failed");
            None
        })
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Err(e) = Self::try_set(key, value) {
            warn!(error = %e, key, "Keychain write failed");
        }
    }

    fn remove(&mut self, key: &str) {
        if let Err(e) = Self::try_remove(key) {
            warn!(error = %e, key, "Keychain delete failed");
        }
    }
}

//! Settings store shared with the options page.
//!
//! Settings live as JSON text under fixed keys of a string key-value area:
//! the rule list under [`SITES_KEY`] and the badge flag under
//! [`DISPLAY_COUNT_KEY`].

use crate::config::SiteRule;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Storage key of the serialized rule list.
pub const SITES_KEY: &str = "corsSites";

/// Storage key of the badge display flag.
pub const DISPLAY_COUNT_KEY: &str = "displayInterceptCount";

/// A string key-value area holding the persisted settings.
pub trait SettingsStore: Send + Sync {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> Result<(), SettingsError>;

    /// Remove `key`.
    fn remove(&self, key: &str) -> Result<(), SettingsError>;

    /// Load the rule list. An absent or empty entry yields `None`.
    fn load_rules(&self) -> Result<Option<Vec<SiteRule>>, SettingsError> {
        match self.get(SITES_KEY)? {
            Some(text) if !text.is_empty() => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| SettingsError::Parse {
                    key: SITES_KEY,
                    source,
                }),
            _ => Ok(None),
        }
    }

    /// Persist the rule list.
    fn store_rules(&self, rules: &[SiteRule]) -> Result<(), SettingsError> {
        let text = serde_json::to_string(rules).map_err(|source| SettingsError::Parse {
            key: SITES_KEY,
            source,
        })?;
        self.set(SITES_KEY, text)
    }

    /// Delete every rule.
    fn clear_rules(&self) -> Result<(), SettingsError> {
        self.store_rules(&[])
    }

    /// Whether the altered-response counter is shown. Defaults to `true`.
    fn display_count(&self) -> Result<bool, SettingsError> {
        match self.get(DISPLAY_COUNT_KEY)? {
            Some(text) => serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
                key: DISPLAY_COUNT_KEY,
                source,
            }),
            None => Ok(true),
        }
    }

    /// Persist the badge display flag.
    fn store_display_count(&self, display: bool) -> Result<(), SettingsError> {
        self.set(DISPLAY_COUNT_KEY, display.to_string())
    }
}

/// In-memory store, mostly for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding the given rules.
    pub fn with_rules(rules: &[SiteRule]) -> Result<Self, SettingsError> {
        let store = Self::new();
        store.store_rules(rules)?;
        Ok(store)
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), SettingsError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object file mapping keys to string values.
///
/// A missing file reads as an empty store. Every write rewrites the file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Settings file not found, using empty store");
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(SettingsError::Corrupt)
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        let content = serde_json::to_string_pretty(entries).map_err(SettingsError::Corrupt)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), SettingsError> {
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value);
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

/// Settings store errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed settings under '{key}': {source}")]
    Parse {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Settings file is not a key-value object: {0}")]
    Corrupt(serde_json::Error),
}

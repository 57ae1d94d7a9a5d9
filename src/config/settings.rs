use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::domain::AppError;

pub const LAST_DOWNLOAD_DIR: &str = "last_download_dir";
pub const LAST_SEARCH: &str = "last_search";

/// Small persisted key-value store for values the UI remembers between sessions.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.values
            .lock()
            .map_err(|_| AppError::Config("settings lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Flat JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonSettingsStore {
    /// Opens `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable settings {:?}: {}", path, e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Io(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(values)
            .map_err(|e| AppError::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(&self.path, content).map_err(|e| AppError::Io(e.to_string()))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| AppError::Config("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

//! Barrage configuration persistence
//!
//! One record, JSON encoded. Saves are synchronous and happen on every
//! mutation; there is no batching. Loads never fail: a missing or corrupt
//! blob reads as "absent" and the engine falls back to defaults.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{BarrageConfig, ConfigError};

/// File name used under the config directory
pub const CONFIG_FILE_NAME: &str = "barrage_config.json";

/// Persistence for [`BarrageConfig`]
pub trait ConfigStore: Send + Sync {
    /// Load the persisted configuration, `None` if absent or unreadable
    fn load(&self) -> Option<BarrageConfig>;

    /// Persist the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be encoded or written.
    fn save(&self, config: &BarrageConfig) -> Result<(), ConfigError>;
}

/// Default store location: `$XDG_CONFIG_HOME/barrage/barrage_config.json`
#[must_use]
pub fn default_store_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("barrage").join(CONFIG_FILE_NAME))
}

/// Decode a persisted blob, treating corrupt data as absent
fn decode(raw: &str, origin: &str) -> Option<BarrageConfig> {
    match serde_json::from_str(raw) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Ignoring corrupt barrage config");
            None
        }
    }
}

/// JSON file on disk
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`default_store_path`], or the working directory if there
    /// is no config directory
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(default_store_path().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME)))
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Option<BarrageConfig> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No persisted barrage config");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read barrage config"
                );
                return None;
            }
        };
        decode(&raw, &self.path.display().to_string())
    }

    fn save(&self, config: &BarrageConfig) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(config)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        std::fs::write(&self.path, json).map_err(|e| ConfigError::WriteError {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!(path = %self.path.display(), "Saved barrage config");
        Ok(())
    }
}

/// In-memory store holding the encoded blob
///
/// Goes through the same JSON encoding as [`JsonFileStore`], which makes it
/// the store of choice for tests and hosts without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a raw blob
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
            saves: Mutex::new(0),
        }
    }

    /// The raw persisted blob
    #[must_use]
    pub fn blob(&self) -> Option<String> {
        self.blob.lock().clone()
    }

    /// Number of successful saves
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Option<BarrageConfig> {
        let blob = self.blob.lock();
        blob.as_deref().and_then(|raw| decode(raw, "memory"))
    }

    fn save(&self, config: &BarrageConfig) -> Result<(), ConfigError> {
        let json = serde_json::to_string(config)?;
        *self.blob.lock() = Some(json);
        *self.saves.lock() += 1;
        Ok(())
    }
}

impl<S: ConfigStore + ?Sized> ConfigStore for std::sync::Arc<S> {
    fn load(&self) -> Option<BarrageConfig> {
        (**self).load()
    }

    fn save(&self, config: &BarrageConfig) -> Result<(), ConfigError> {
        (**self).save(config)
    }
}

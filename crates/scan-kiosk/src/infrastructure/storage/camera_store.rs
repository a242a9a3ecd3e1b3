//! Last-used camera persistence.
//!
//! The kiosk remembers, per scanning context, the id of the camera it last
//! opened successfully, and prefers it on the next start.  The value is a
//! convenience: a store that cannot be read or written never blocks scanning.
//!
//! `state.toml` layout:
//!
//! ```toml
//! [cameras]
//! portal = "a1b2c3…"
//! admin = "d4e5f6…"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::infrastructure::decoder::lock_unpoisoned;

/// Error type for camera store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error accessing kiosk state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse kiosk state: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize kiosk state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Key-value persistence for the last-used camera id.
pub trait CameraStore: Send + Sync {
    /// Returns the camera id last saved for `context`, if any.
    fn load(&self, context: &str) -> Option<String>;

    /// Records `camera_id` as the last camera used in `context`.
    fn save(&self, context: &str, camera_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KioskState {
    #[serde(default)]
    cameras: BTreeMap<String, String>,
}

/// [`CameraStore`] backed by a `[cameras]` table in a TOML state file.
#[derive(Debug, Clone)]
pub struct TomlCameraStore {
    path: PathBuf,
}

impl TomlCameraStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> Result<KioskState, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KioskState::default()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_state(&self, state: &KioskState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(state)?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl CameraStore for TomlCameraStore {
    fn load(&self, context: &str) -> Option<String> {
        match self.read_state() {
            Ok(mut state) => state.cameras.remove(context),
            Err(e) => {
                warn!("ignoring unreadable kiosk state: {e}");
                None
            }
        }
    }

    fn save(&self, context: &str, camera_id: &str) -> Result<(), StoreError> {
        // A corrupt file is replaced rather than blocking the save.
        let mut state = self.read_state().unwrap_or_else(|e| {
            debug!("rewriting kiosk state after read failure: {e}");
            KioskState::default()
        });
        if state.cameras.get(context).map(String::as_str) == Some(camera_id) {
            return Ok(());
        }
        state
            .cameras
            .insert(context.to_string(), camera_id.to_string());
        self.write_state(&state)
    }
}

/// In-memory [`CameraStore`] for tests and ephemeral kiosks.
#[derive(Debug, Default)]
pub struct MemoryCameraStore {
    cameras: Mutex<HashMap<String, String>>,
}

impl MemoryCameraStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already remembers `camera_id` for `context`.
    pub fn with_entry(context: &str, camera_id: &str) -> Self {
        let store = Self::new();
        lock_unpoisoned(&store.cameras).insert(context.to_string(), camera_id.to_string());
        store
    }
}

impl CameraStore for MemoryCameraStore {
    fn load(&self, context: &str) -> Option<String> {
        lock_unpoisoned(&self.cameras).get(context).cloned()
    }

    fn save(&self, context: &str, camera_id: &str) -> Result<(), StoreError> {
        lock_unpoisoned(&self.cameras).insert(context.to_string(), camera_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_state() -> (PathBuf, TomlCameraStore) {
        let dir = std::env::temp_dir().join(format!("merit_scan_state_{}", Uuid::new_v4()));
        let store = TomlCameraStore::new(dir.join("state.toml"));
        (dir, store)
    }

    #[test]
    fn test_load_from_missing_file_is_none() {
        let (_dir, store) = temp_state();
        assert_eq!(store.load("portal"), None);
    }

    #[test]
    fn test_save_then_load_per_context() {
        // Arrange
        let (dir, store) = temp_state();

        // Act
        store.save("portal", "cam-rear").unwrap();
        store.save("admin", "cam-front").unwrap();

        // Assert
        assert_eq!(store.load("portal").as_deref(), Some("cam-rear"));
        assert_eq!(store.load("admin").as_deref(), Some("cam-front"));
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("[cameras]"), "got {raw}");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_state_is_ignored_on_load_and_replaced_on_save() {
        // Arrange
        let (dir, store) = temp_state();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(store.path(), "cameras = [[[").unwrap();

        // Act / Assert
        assert_eq!(store.load("portal"), None);
        store.save("portal", "cam-1").unwrap();
        assert_eq!(store.load("portal").as_deref(), Some("cam-1"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_memory_store_overwrites_previous_id() {
        let store = MemoryCameraStore::with_entry("portal", "cam-1");
        store.save("portal", "cam-2").unwrap();
        assert_eq!(store.load("portal").as_deref(), Some("cam-2"));
    }
}

//! Persisted state snapshots
//!
//! Each store persists as one JSON snapshot under the platform data
//! directory, keyed by a fixed namespace string. Snapshots are loaded once
//! at startup and rewritten on every mutation; writes go through a named
//! temp file in the target directory and are renamed into place so a crash
//! mid-write can never leave a half-written record. The snapshots carry no
//! schema version field, so evolving them needs an explicit migration.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

pub const CHARACTERS_NAMESPACE: &str = "vietrp-characters";
pub const CHATS_NAMESPACE: &str = "vietrp-chats";
pub const SETTINGS_NAMESPACE: &str = "vietrp-settings";

/// Errors that can occur when reading or writing a persisted record.
#[derive(Debug)]
pub enum StorageError {
    /// Failed to read the record from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The record exists but is not valid JSON for its store.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The snapshot could not be serialized.
    Serialize { source: serde_json::Error },
    /// Failed to write the record to disk.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Read { path, source } => {
                write!(f, "Failed to read state at {}: {}", path.display(), source)
            }
            StorageError::Parse { path, source } => {
                write!(f, "Failed to parse state at {}: {}", path.display(), source)
            }
            StorageError::Serialize { source } => {
                write!(f, "Failed to serialize state snapshot: {source}")
            }
            StorageError::Write { path, source } => {
                write!(f, "Failed to write state at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Read { source, .. } => Some(source),
            StorageError::Parse { source, .. } => Some(source),
            StorageError::Serialize { source } => Some(source),
            StorageError::Write { source, .. } => Some(source),
        }
    }
}

/// Handle on the directory holding the persisted records.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Storage rooted at the platform data directory.
    pub fn new() -> Self {
        let proj_dirs = ProjectDirs::from("app", "vietrp", "vietrp")
            .expect("Failed to determine data directory");
        Self {
            data_dir: proj_dirs.data_dir().to_path_buf(),
        }
    }

    /// Storage rooted at an explicit directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
        }
    }

    fn record_path(&self, namespace: &str) -> PathBuf {
        self.data_dir.join(format!("{namespace}.json"))
    }

    /// Load a record, `Ok(None)` when it has never been written.
    pub fn load<T: DeserializeOwned>(&self, namespace: &str) -> Result<Option<T>, StorageError> {
        let path = self.record_path(namespace);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|source| StorageError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StorageError::Parse { path, source })
    }

    /// Load a record, falling back to the type's defaults when the record is
    /// missing or unreadable. An unreadable record is reported, not fatal.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, namespace: &str) -> T {
        match self.load(namespace) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(err) => {
                tracing::warn!(namespace, error = %err, "unreadable state record, starting from defaults");
                T::default()
            }
        }
    }

    /// Atomically replace a record with a fresh snapshot.
    pub fn save<T: Serialize>(&self, namespace: &str, value: &T) -> Result<(), StorageError> {
        let path = self.record_path(namespace);
        let write_err = |source| StorageError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.data_dir).map_err(write_err)?;

        let contents = serde_json::to_string_pretty(value)
            .map_err(|source| StorageError::Serialize { source })?;

        let mut temp_file = NamedTempFile::new_in(&self.data_dir).map_err(write_err)?;
        temp_file.write_all(contents.as_bytes()).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(&path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn dir(&self) -> &std::path::Path {
        &self.data_dir
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

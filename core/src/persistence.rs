use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{IdentityRecord, Registry, RegistryError};

mod fsync;
mod snapshot;

use fsync::sync_parent_dir;
use snapshot::{commit_snapshot, load_snapshot, write_snapshot};

#[derive(Debug)]
pub enum PersistenceError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Registry(RegistryError),
    /// The new document replaced the old one but the directory entry could
    /// not be synced. The write is visible and kept in memory.
    NotDurable(std::io::Error),
    /// Persisted bytes exist but do not decode into a valid registry.
    StorageCorrupt(String),
}

impl PersistenceError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::DuplicateIdentifier(_)))
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::StorageCorrupt(_))
    }

    /// True when the write reached the registry file despite the error.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::NotDurable(_))
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {error}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Registry(error) => write!(f, "registry error: {error}"),
            Self::NotDurable(error) => {
                write!(f, "registry written but directory sync failed: {error}")
            }
            Self::StorageCorrupt(message) => write!(f, "registry storage is corrupt: {message}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::Serde(error) => Some(error),
            Self::Registry(error) => Some(error),
            Self::NotDurable(error) => Some(error),
            Self::StorageCorrupt(_) => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<RegistryError> for PersistenceError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// Loads the registry at `path`. A missing file yields an empty registry,
/// which is written out immediately so later loads always find a file.
pub fn load_registry(path: &Path, dimension: usize) -> Result<Registry, PersistenceError> {
    if let Some(registry) = load_snapshot(path, dimension)? {
        return Ok(registry);
    }

    let registry = Registry::new(dimension)?;
    write_snapshot(path, &registry)?;
    Ok(registry)
}

/// Replaces the file at `path` with `registry`. Either the previous or the
/// new contents survive a crash; never a partial write.
pub fn persist_registry(path: &Path, registry: &Registry) -> Result<(), PersistenceError> {
    write_snapshot(path, registry)
}

/// Owns the registry file and the in-memory snapshot loaded from it.
#[derive(Debug)]
pub struct RegistryStore {
    path: PathBuf,
    registry: Registry,
}

impl RegistryStore {
    pub fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self, PersistenceError> {
        let path = path.into();
        let registry = load_registry(&path, dimension)?;
        Ok(Self { path, registry })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn exists(&self, user_id: &str) -> bool {
        self.registry.exists(user_id)
    }

    /// Appends `record` and persists the whole registry. Rejected records
    /// never reach the disk; a write that fails before the file is replaced
    /// is undone in memory. A failed directory sync after the replace keeps
    /// the record and reports [`PersistenceError::NotDurable`].
    pub fn insert(&mut self, record: IdentityRecord) -> Result<(), PersistenceError> {
        self.insert_with_sync(record, sync_parent_dir)
    }

    fn insert_with_sync(
        &mut self,
        record: IdentityRecord,
        sync: impl FnOnce(&Path) -> std::io::Result<()>,
    ) -> Result<(), PersistenceError> {
        self.registry.insert(record)?;

        if let Err(error) = commit_snapshot(&self.path, &self.registry) {
            self.registry.rollback_last();
            return Err(error);
        }
        sync(&self.path).map_err(PersistenceError::NotDurable)
    }

    pub fn persist(&self) -> Result<(), PersistenceError> {
        persist_registry(&self.path, &self.registry)
    }
}

#[cfg(test)]
mod tests;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{IdentityRecord, Registry};

use super::fsync::{ensure_parent_dir, sync_parent_dir, write_file_fully_synced};
use super::PersistenceError;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotDocument {
    version: u32,
    dimension: usize,
    checksum: u32,
    records: Vec<IdentityRecord>,
}

/// Layout written by the first generation of the enrollment tool: three
/// co-indexed lists where position `i` of each belongs to the same person.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyDocument {
    encodings: Vec<Vec<f32>>,
    usernames: Vec<String>,
    user_ids: Vec<String>,
}

pub(super) fn load_snapshot(
    path: &Path,
    dimension: usize,
) -> Result<Option<Registry>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read(path)?;
    let document: Value = serde_json::from_slice(&raw)
        .map_err(|error| corrupt(format!("registry file is not valid json: {error}")))?;

    let registry = if document.get("records").is_some() {
        registry_from_snapshot(document, dimension)?
    } else if document.get("encodings").is_some() {
        registry_from_legacy(document, dimension)?
    } else {
        return Err(corrupt("unrecognised registry layout"));
    };

    Ok(Some(registry))
}

pub(super) fn write_snapshot(path: &Path, registry: &Registry) -> Result<(), PersistenceError> {
    commit_snapshot(path, registry)?;
    sync_parent_dir(path)?;
    Ok(())
}

/// Writes the document next to `path` and renames it into place. On success
/// the new contents are visible; only the directory entry may be unsynced.
pub(super) fn commit_snapshot(path: &Path, registry: &Registry) -> Result<(), PersistenceError> {
    ensure_parent_dir(path)?;

    let snapshot = SnapshotDocument {
        version: SNAPSHOT_VERSION,
        dimension: registry.dimension(),
        checksum: records_checksum(registry.records()),
        records: registry.records().to_vec(),
    };

    let temp_path = temp_path_for(path);
    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    write_file_fully_synced(&temp_path, &bytes)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// `<file name>.tmp` in the same directory, never equal to `path` itself.
pub(super) fn temp_path_for(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("registry"));
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

fn registry_from_snapshot(document: Value, dimension: usize) -> Result<Registry, PersistenceError> {
    let snapshot: SnapshotDocument = serde_json::from_value(document)
        .map_err(|error| corrupt(format!("invalid registry document: {error}")))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(corrupt(format!(
            "unsupported registry version {}",
            snapshot.version
        )));
    }
    if snapshot.dimension != dimension {
        return Err(corrupt(format!(
            "registry stores {}-d vectors, expected {dimension}-d",
            snapshot.dimension
        )));
    }
    let actual = records_checksum(&snapshot.records);
    if actual != snapshot.checksum {
        return Err(corrupt(format!(
            "checksum mismatch: stored={:#010x}, computed={actual:#010x}",
            snapshot.checksum
        )));
    }

    Registry::from_records(dimension, snapshot.records)
        .map_err(|error| corrupt(format!("invalid registry record: {error}")))
}

fn registry_from_legacy(document: Value, dimension: usize) -> Result<Registry, PersistenceError> {
    let legacy: LegacyDocument = serde_json::from_value(document)
        .map_err(|error| corrupt(format!("invalid legacy registry document: {error}")))?;

    let len = legacy.user_ids.len();
    if legacy.usernames.len() != len || legacy.encodings.len() != len {
        return Err(corrupt(format!(
            "legacy registry lists differ in length: encodings={}, usernames={}, user_ids={len}",
            legacy.encodings.len(),
            legacy.usernames.len()
        )));
    }

    let records = legacy
        .user_ids
        .into_iter()
        .zip(legacy.usernames)
        .zip(legacy.encodings)
        .map(|((user_id, display_name), feature_vector)| {
            IdentityRecord::new(user_id, display_name, feature_vector)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| corrupt(format!("invalid legacy registry record: {error}")))?;

    Registry::from_records(dimension, records)
        .map_err(|error| corrupt(format!("invalid legacy registry record: {error}")))
}

/// CRC32 over every record in order, length-prefixing each field.
fn records_checksum(records: &[IdentityRecord]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for record in records {
        for field in [record.user_id.as_bytes(), record.display_name.as_bytes()] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
        hasher.update(&(record.feature_vector.len() as u64).to_le_bytes());
        for value in &record.feature_vector {
            hasher.update(&value.to_le_bytes());
        }
    }
    hasher.finalize()
}

fn corrupt(message: impl Into<String>) -> PersistenceError {
    PersistenceError::StorageCorrupt(message.into())
}

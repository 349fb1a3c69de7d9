use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use crate::record::{IdentityRecord, RecordError};

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    InvalidConfig(String),
    DuplicateIdentifier(String),
    Record(RecordError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(message) => write!(f, "invalid config: {message}"),
            Self::DuplicateIdentifier(user_id) => {
                write!(f, "user id '{user_id}' is already enrolled")
            }
            Self::Record(error) => write!(f, "invalid record: {error}"),
        }
    }
}

impl Error for RegistryError {}

impl From<RecordError> for RegistryError {
    fn from(value: RecordError) -> Self {
        Self::Record(value)
    }
}

/// Enrolled identities in insertion order, indexed by user id.
#[derive(Debug, Clone)]
pub struct Registry {
    dimension: usize,
    records: Vec<IdentityRecord>,
    index: HashMap<String, usize>,
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension && self.records == other.records
    }
}

impl Registry {
    pub fn new(dimension: usize) -> Result<Self, RegistryError> {
        if dimension == 0 {
            return Err(RegistryError::InvalidConfig("dimension must be > 0".to_string()));
        }

        Ok(Self {
            dimension,
            records: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Rebuilds a registry from stored records, enforcing every insert rule.
    pub fn from_records(
        dimension: usize,
        records: impl IntoIterator<Item = IdentityRecord>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(dimension)?;
        for record in records {
            registry.insert(record)?;
        }
        Ok(registry)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids are compared after trimming, the same way they are stored.
    pub fn exists(&self, user_id: &str) -> bool {
        self.index.contains_key(user_id.trim())
    }

    pub fn get(&self, user_id: &str) -> Option<&IdentityRecord> {
        self.index
            .get(user_id.trim())
            .and_then(|position| self.records.get(*position))
    }

    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityRecord> + '_ {
        self.records.iter()
    }

    /// Appends `record`. Validation and the uniqueness check run before any
    /// state changes, so a rejected insert leaves the registry untouched.
    pub fn insert(&mut self, record: IdentityRecord) -> Result<(), RegistryError> {
        let record = record.trimmed();
        record.validate(self.dimension)?;
        if self.exists(&record.user_id) {
            return Err(RegistryError::DuplicateIdentifier(record.user_id));
        }

        self.index.insert(record.user_id.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    /// Returns a copy of this registry with `record` appended.
    pub fn with_record(&self, record: IdentityRecord) -> Result<Self, RegistryError> {
        let mut next = self.clone();
        next.insert(record)?;
        Ok(next)
    }

    /// Undoes the most recent insert; used when persisting it failed.
    pub(crate) fn rollback_last(&mut self) -> Option<IdentityRecord> {
        let record = self.records.pop()?;
        self.index.remove(&record.user_id);
        Some(record)
    }
}

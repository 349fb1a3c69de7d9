use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vector::{validate_feature_vector, FeatureVector, VectorError};

/// One enrolled person: primary key, display name and face encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub user_id: String,
    pub display_name: String,
    pub feature_vector: FeatureVector,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    EmptyUserId,
    EmptyDisplayName,
    InvalidVector(VectorError),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyUserId => write!(f, "user id must not be empty"),
            Self::EmptyDisplayName => write!(f, "display name must not be empty"),
            Self::InvalidVector(error) => write!(f, "invalid feature vector: {error}"),
        }
    }
}

impl Error for RecordError {}

impl From<VectorError> for RecordError {
    fn from(value: VectorError) -> Self {
        Self::InvalidVector(value)
    }
}

impl IdentityRecord {
    /// Builds a record, trimming the identifier and display name.
    pub fn new(
        user_id: impl AsRef<str>,
        display_name: impl AsRef<str>,
        feature_vector: FeatureVector,
    ) -> Result<Self, RecordError> {
        let user_id = user_id.as_ref().trim();
        let display_name = display_name.as_ref().trim();
        if user_id.is_empty() {
            return Err(RecordError::EmptyUserId);
        }
        if display_name.is_empty() {
            return Err(RecordError::EmptyDisplayName);
        }

        Ok(Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            feature_vector,
        })
    }

    /// Strips surrounding whitespace from the id and the display name.
    pub fn trimmed(mut self) -> Self {
        if self.user_id.trim().len() != self.user_id.len() {
            self.user_id = self.user_id.trim().to_string();
        }
        if self.display_name.trim().len() != self.display_name.len() {
            self.display_name = self.display_name.trim().to_string();
        }
        self
    }

    pub fn dimension(&self) -> usize {
        self.feature_vector.len()
    }

    /// Validates the fields against a registry of `dimension`-d encodings.
    pub fn validate(&self, dimension: usize) -> Result<(), RecordError> {
        if self.user_id.trim().is_empty() {
            return Err(RecordError::EmptyUserId);
        }
        if self.display_name.trim().is_empty() {
            return Err(RecordError::EmptyDisplayName);
        }
        validate_feature_vector(&self.feature_vector, dimension)?;
        Ok(())
    }
}

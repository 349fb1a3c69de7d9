//! Nearest-neighbour identification over an in-memory [`Registry`].
//!
//! The scan is linear: every record is compared against the observed vector,
//! records within the tolerance become candidates, and the closest candidate
//! wins. Equal distances resolve to the record that was enrolled first.

use std::error::Error;
use std::fmt;

use crate::vector::{validate_feature_vector, PreparedQuery, VectorError};
use crate::Registry;

/// Match tolerance of the reference extractor's distance scale.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    InvalidTolerance(f32),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTolerance(value) => {
                write!(f, "tolerance must be finite and >= 0, got {value}")
            }
        }
    }
}

impl Error for MatchError {}

/// Outcome of identifying one observed face.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Identified {
        user_id: String,
        display_name: String,
        distance: f32,
        /// Display score in `[0, 100]`; not a calibrated probability.
        confidence: f32,
    },
    Unknown,
}

impl MatchOutcome {
    pub fn is_identified(&self) -> bool {
        matches!(self, Self::Identified { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Identified { user_id, .. } => Some(user_id),
            Self::Unknown => None,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::Identified { confidence, .. } => *confidence,
            Self::Unknown => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    tolerance: f32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Matcher {
    pub fn new(tolerance: f32) -> Result<Self, MatchError> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(MatchError::InvalidTolerance(tolerance));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Identifies `observed` against `registry`.
    ///
    /// An empty registry always yields [`MatchOutcome::Unknown`]. Otherwise
    /// `observed` must have the registry's dimension and finite components.
    pub fn identify(
        &self,
        registry: &Registry,
        observed: &[f32],
    ) -> Result<MatchOutcome, VectorError> {
        if registry.is_empty() {
            return Ok(MatchOutcome::Unknown);
        }
        validate_feature_vector(observed, registry.dimension())?;

        let query = PreparedQuery::new(observed);
        let mut best: Option<(usize, f32)> = None;
        for (position, record) in registry.iter().enumerate() {
            let distance = query.distance(&record.feature_vector);
            if distance > self.tolerance {
                continue;
            }
            // Strict comparison keeps the earliest record on ties.
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((position, distance));
            }
        }

        let Some((position, distance)) = best else {
            return Ok(MatchOutcome::Unknown);
        };
        let record = &registry.records()[position];
        Ok(MatchOutcome::Identified {
            user_id: record.user_id.clone(),
            display_name: record.display_name.clone(),
            distance,
            confidence: confidence_from_distance(distance),
        })
    }
}

/// `(1 - distance) * 100`, clamped to `[0, 100]` and rounded to 2 decimals.
pub fn confidence_from_distance(distance: f32) -> f32 {
    let score = ((1.0 - f64::from(distance)) * 100.0).clamp(0.0, 100.0);
    ((score * 100.0).round() / 100.0) as f32
}

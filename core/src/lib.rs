#![forbid(unsafe_code)]
//! Core of the Visage enrollment and verification tool.
//!
//! Holds the identity registry with its durable store, the nearest-neighbour
//! matcher, and the enrollment and verification sessions that sit between a
//! capture device and a face analyzer.

pub mod archive;
pub mod capture;
pub mod enrollment;
pub mod matcher;
pub mod persistence;
pub mod record;
pub mod registry;
pub mod vector;
pub mod verification;

#[cfg(test)]
mod test_support;

pub use archive::{archive_frame, ArchiveError};
pub use capture::{
    encode_single_face, rgb8_len, BoundingBox, CaptureDevice, CaptureError, FaceAnalyzer, Frame,
};
pub use enrollment::{EnrollmentError, EnrollmentReceipt, EnrollmentSession, EnrollmentStage};
pub use matcher::{confidence_from_distance, MatchError, MatchOutcome, Matcher, DEFAULT_TOLERANCE};
pub use persistence::{load_registry, persist_registry, PersistenceError, RegistryStore};
pub use record::{IdentityRecord, RecordError};
pub use registry::{Registry, RegistryError};
pub use vector::{
    euclidean_distance, validate_feature_vector, FeatureVector, PreparedQuery, VectorError,
    DEFAULT_DIMENSION,
};
pub use verification::{
    FaceMatch, PollOutcome, VerificationError, VerificationSession,
    DEFAULT_MAX_CONSECUTIVE_FAILURES,
};

//! Enrollment workflow: validate details, capture one face, store it.
//!
//! The session moves through [`EnrollmentStage::AwaitingDetails`],
//! [`EnrollmentStage::DetailsValidated`] and [`EnrollmentStage::Captured`].
//! Each operation is only permitted in one stage, so an identifier is always
//! checked for collisions before the camera is touched.

use std::error::Error;
use std::fmt;

use crate::capture::{encode_single_face, CaptureDevice, CaptureError, FaceAnalyzer, Frame};
use crate::persistence::{PersistenceError, RegistryStore};
use crate::registry::RegistryError;
use crate::IdentityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStage {
    AwaitingDetails,
    DetailsValidated,
    Captured,
}

impl fmt::Display for EnrollmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AwaitingDetails => "awaiting_details",
            Self::DetailsValidated => "details_validated",
            Self::Captured => "captured",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub enum EnrollmentError {
    MissingDetails,
    OutOfOrder { stage: EnrollmentStage },
    Capture(CaptureError),
    Store(PersistenceError),
}

impl EnrollmentError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Store(error) if error.is_duplicate())
    }

    /// Capture-quality problems the user can fix by simply trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Capture(_))
    }
}

impl fmt::Display for EnrollmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDetails => write!(f, "both user id and display name are required"),
            Self::OutOfOrder { stage } => {
                write!(f, "operation not permitted in stage '{stage}'")
            }
            Self::Capture(error) => write!(f, "{error}"),
            Self::Store(error) => write!(f, "{error}"),
        }
    }
}

impl Error for EnrollmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Capture(error) => Some(error),
            Self::Store(error) => Some(error),
            Self::MissingDetails | Self::OutOfOrder { .. } => None,
        }
    }
}

impl From<CaptureError> for EnrollmentError {
    fn from(value: CaptureError) -> Self {
        Self::Capture(value)
    }
}

impl From<PersistenceError> for EnrollmentError {
    fn from(value: PersistenceError) -> Self {
        Self::Store(value)
    }
}

/// What a successful capture stored, plus the frame it came from.
#[derive(Debug, Clone)]
pub struct EnrollmentReceipt {
    pub user_id: String,
    pub display_name: String,
    pub frame: Frame,
}

#[derive(Debug, Clone)]
struct ApplicantDetails {
    user_id: String,
    display_name: String,
}

/// One enrollment form bound to an exclusively owned capture device. The
/// device is released when the session is dropped.
pub struct EnrollmentSession<D: CaptureDevice> {
    device: D,
    stage: EnrollmentStage,
    details: Option<ApplicantDetails>,
}

impl<D: CaptureDevice> EnrollmentSession<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            stage: EnrollmentStage::AwaitingDetails,
            details: None,
        }
    }

    pub fn stage(&self) -> EnrollmentStage {
        self.stage
    }

    pub fn submit_details(
        &mut self,
        store: &RegistryStore,
        user_id: &str,
        display_name: &str,
    ) -> Result<(), EnrollmentError> {
        self.expect_stage(EnrollmentStage::AwaitingDetails)?;

        let user_id = user_id.trim();
        let display_name = display_name.trim();
        if user_id.is_empty() || display_name.is_empty() {
            return Err(EnrollmentError::MissingDetails);
        }
        if store.exists(user_id) {
            return Err(PersistenceError::Registry(RegistryError::DuplicateIdentifier(
                user_id.to_string(),
            ))
            .into());
        }

        self.details = Some(ApplicantDetails {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
        });
        self.stage = EnrollmentStage::DetailsValidated;
        Ok(())
    }

    /// Captures one frame and stores the single face in it. On failure the
    /// session stays in [`EnrollmentStage::DetailsValidated`] for a retry.
    pub fn capture<A: FaceAnalyzer + ?Sized>(
        &mut self,
        analyzer: &mut A,
        store: &mut RegistryStore,
    ) -> Result<EnrollmentReceipt, EnrollmentError> {
        self.expect_stage(EnrollmentStage::DetailsValidated)?;
        let Some(details) = self.details.clone() else {
            return Err(EnrollmentError::OutOfOrder { stage: self.stage });
        };

        let frame = self.device.read().ok_or(CaptureError::CaptureFailure)?;
        let (_, encoding) = encode_single_face(analyzer, &frame, store.registry().dimension())?;
        let record = IdentityRecord {
            user_id: details.user_id,
            display_name: details.display_name,
            feature_vector: encoding,
        };
        let receipt = EnrollmentReceipt {
            user_id: record.user_id.clone(),
            display_name: record.display_name.clone(),
            frame,
        };
        if let Err(error) = store.insert(record) {
            // A committed record cannot be captured again under the same id.
            if error.is_committed() {
                self.stage = EnrollmentStage::Captured;
            }
            return Err(error.into());
        }

        self.stage = EnrollmentStage::Captured;
        Ok(receipt)
    }

    /// Clears the form for the next applicant.
    pub fn reset(&mut self) {
        self.details = None;
        self.stage = EnrollmentStage::AwaitingDetails;
    }

    fn expect_stage(&self, expected: EnrollmentStage) -> Result<(), EnrollmentError> {
        if self.stage != expected {
            return Err(EnrollmentError::OutOfOrder { stage: self.stage });
        }
        Ok(())
    }
}

impl<D: CaptureDevice> Drop for EnrollmentSession<D> {
    fn drop(&mut self) {
        self.device.release();
    }
}

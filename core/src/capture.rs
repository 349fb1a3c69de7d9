//! Seams to the camera and to the face detector/extractor.
//!
//! Neither collaborator is implemented here. Sessions own a
//! [`CaptureDevice`] and borrow a [`FaceAnalyzer`] per frame.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vector::{validate_feature_vector, FeatureVector};

/// RGB8 raster as handed over by the capture device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            sequence,
            width,
            height,
            pixels,
        }
    }

    /// Byte length a tightly packed RGB8 buffer of this size must have, or
    /// `None` when it does not fit in `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        rgb8_len(self.width, self.height)
    }
}

/// `width * height * 3`, checked.
pub fn rgb8_len(width: u32, height: u32) -> Option<usize> {
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(3)
}

/// Face region in pixel coordinates, edges inclusive of `top`/`left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

pub trait CaptureDevice {
    /// Next available frame, or `None` when the device produced nothing.
    fn read(&mut self) -> Option<Frame>;

    /// Frees the underlying device. Called exactly once when the owning
    /// session ends.
    fn release(&mut self);
}

pub trait FaceAnalyzer {
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox>;

    /// One encoding per input box, in the same order. A shorter result means
    /// the extractor gave up on the trailing boxes.
    fn encode(&mut self, frame: &Frame, boxes: &[BoundingBox]) -> Vec<FeatureVector>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    CaptureFailure,
    NoFaceDetected,
    MultipleFacesDetected { count: usize },
    EncodingFailed,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureFailure => write!(f, "capture device did not produce a frame"),
            Self::NoFaceDetected => write!(f, "no face detected"),
            Self::MultipleFacesDetected { count } => write!(
                f,
                "ambiguous capture: {count} faces present, exactly one is required"
            ),
            Self::EncodingFailed => write!(f, "failed to encode the detected face"),
        }
    }
}

impl Error for CaptureError {}

/// Enrollment-time extraction: requires exactly one face and a usable
/// `dimension`-d encoding for it. Checks run in that order and stop at the
/// first failure.
pub fn encode_single_face<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    frame: &Frame,
    dimension: usize,
) -> Result<(BoundingBox, FeatureVector), CaptureError> {
    let boxes = analyzer.detect(frame);
    let face = match boxes.as_slice() {
        [] => return Err(CaptureError::NoFaceDetected),
        [face] => *face,
        _ => {
            return Err(CaptureError::MultipleFacesDetected { count: boxes.len() });
        }
    };

    let encoding = analyzer
        .encode(frame, std::slice::from_ref(&face))
        .into_iter()
        .next()
        .ok_or(CaptureError::EncodingFailed)?;
    validate_feature_vector(&encoding, dimension).map_err(|_| CaptureError::EncodingFailed)?;

    Ok((face, encoding))
}

//! Live identification, one frame per poll.
//!
//! A [`VerificationSession`] owns the capture device and is driven by an
//! external pacer. Each [`VerificationSession::poll`] pulls at most one frame,
//! matches every detected face and returns; nothing is queued between polls,
//! so a slow cycle drops frames instead of accumulating them.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::{BoundingBox, CaptureDevice, FaceAnalyzer};
use crate::matcher::{MatchOutcome, Matcher};
use crate::Registry;

/// Consecutive empty reads tolerated before the device counts as gone.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub bbox: BoundingBox,
    pub outcome: MatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PollOutcome {
    /// Verification is switched off; the device was not read.
    #[default]
    Suspended,
    /// The device produced no frame this cycle.
    NoFrame,
    /// One entry per face that could be encoded, in detection order.
    Observed { faces: Vec<FaceMatch> },
}

impl PollOutcome {
    pub fn faces(&self) -> &[FaceMatch] {
        match self {
            Self::Observed { faces } => faces,
            Self::Suspended | Self::NoFrame => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    DeviceUnavailable { consecutive_failures: u32 },
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceUnavailable {
                consecutive_failures,
            } => write!(
                f,
                "capture device unavailable after {consecutive_failures} consecutive failed reads"
            ),
        }
    }
}

impl Error for VerificationError {}

pub struct VerificationSession<D: CaptureDevice> {
    device: D,
    active: Arc<AtomicBool>,
    last_outcome: PollOutcome,
    consecutive_failures: u32,
    max_consecutive_failures: u32,
}

impl<D: CaptureDevice> VerificationSession<D> {
    /// Starts suspended; call [`Self::set_active`] to begin matching.
    pub fn new(device: D) -> Self {
        Self {
            device,
            active: Arc::new(AtomicBool::new(false)),
            last_outcome: PollOutcome::Suspended,
            consecutive_failures: 0,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    pub fn with_max_consecutive_failures(mut self, max_consecutive_failures: u32) -> Self {
        self.max_consecutive_failures = max_consecutive_failures;
        self
    }

    /// Shared switch checked at the top of every poll.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn last_outcome(&self) -> &PollOutcome {
        &self.last_outcome
    }

    pub fn poll<A: FaceAnalyzer + ?Sized>(
        &mut self,
        analyzer: &mut A,
        registry: &Registry,
        matcher: &Matcher,
    ) -> Result<&PollOutcome, VerificationError> {
        if !self.is_active() {
            self.last_outcome = PollOutcome::Suspended;
            return Ok(&self.last_outcome);
        }

        let Some(frame) = self.device.read() else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.last_outcome = PollOutcome::NoFrame;
            if self.consecutive_failures > self.max_consecutive_failures {
                return Err(VerificationError::DeviceUnavailable {
                    consecutive_failures: self.consecutive_failures,
                });
            }
            return Ok(&self.last_outcome);
        };
        self.consecutive_failures = 0;

        let boxes = analyzer.detect(&frame);
        let faces = if boxes.is_empty() {
            Vec::new()
        } else {
            let encodings = analyzer.encode(&frame, &boxes);
            boxes
                .into_iter()
                .zip(encodings)
                .filter_map(|(bbox, encoding)| {
                    // A malformed encoding is a transient miss, not a failure.
                    let outcome = matcher.identify(registry, &encoding).ok()?;
                    Some(FaceMatch { bbox, outcome })
                })
                .collect()
        };

        self.last_outcome = PollOutcome::Observed { faces };
        Ok(&self.last_outcome)
    }
}

impl<D: CaptureDevice> Drop for VerificationSession<D> {
    fn drop(&mut self) {
        self.device.release();
    }
}

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{interval, MissedTickBehavior};
use visage_core::{
    CaptureDevice, FaceAnalyzer, MatchOutcome, Matcher, PollOutcome, Registry,
    VerificationSession,
};

use crate::config::AppConfig;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct VerifySummary {
    pub(crate) frames_polled: u64,
    pub(crate) empty_reads: u64,
    pub(crate) identified: u64,
    pub(crate) unknown: u64,
}

/// Polls the device once per tick until `max_polls` frames were requested or
/// `shutdown` resolves. Ticks missed behind a slow cycle are skipped.
pub(crate) async fn run_verify<D, A, F>(
    config: &AppConfig,
    registry: &Registry,
    device: D,
    analyzer: &mut A,
    max_polls: u64,
    shutdown: F,
) -> Result<VerifySummary>
where
    D: CaptureDevice,
    A: FaceAnalyzer,
    F: Future<Output = ()>,
{
    let matcher = Matcher::new(config.match_tolerance).context("invalid match tolerance")?;
    let mut session = VerificationSession::new(device)
        .with_max_consecutive_failures(config.max_capture_failures);
    session.set_active(true);

    let mut ticker = interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut summary = VerifySummary::default();
    while summary.frames_polled < max_polls {
        tokio::select! {
            biased;
            _ = &mut shutdown => session.set_active(false),
            _ = ticker.tick() => {}
        }

        let outcome = session
            .poll(analyzer, registry, &matcher)
            .context("verification stopped")?;
        match outcome {
            PollOutcome::Suspended => break,
            PollOutcome::NoFrame => summary.empty_reads += 1,
            PollOutcome::Observed { faces } => {
                for face in faces {
                    match &face.outcome {
                        MatchOutcome::Identified {
                            user_id,
                            display_name,
                            distance,
                            confidence,
                        } => {
                            summary.identified += 1;
                            tracing::info!(
                                %user_id,
                                %display_name,
                                distance,
                                confidence,
                                left = face.bbox.left,
                                top = face.bbox.top,
                                "face identified"
                            );
                        }
                        MatchOutcome::Unknown => {
                            summary.unknown += 1;
                            tracing::info!(
                                left = face.bbox.left,
                                top = face.bbox.top,
                                "unknown face"
                            );
                        }
                    }
                }
            }
        }
        summary.frames_polled += 1;
    }

    tracing::info!(
        frames_polled = summary.frames_polled,
        empty_reads = summary.empty_reads,
        identified = summary.identified,
        unknown = summary.unknown,
        "verification finished"
    );
    Ok(summary)
}

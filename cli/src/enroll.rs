use std::path::Path;

use anyhow::{Context, Result};
use visage_core::{
    archive_frame, CaptureDevice, EnrollmentError, EnrollmentReceipt, EnrollmentSession,
    FaceAnalyzer, RegistryStore,
};

use crate::config::AppConfig;

/// Runs one enrollment: validate details, then capture until a frame yields
/// exactly one encodable face or the attempt budget runs out.
pub(crate) fn run_enroll<D, A>(
    config: &AppConfig,
    device: D,
    analyzer: &mut A,
    user_id: &str,
    display_name: &str,
) -> Result<EnrollmentReceipt>
where
    D: CaptureDevice,
    A: FaceAnalyzer,
{
    let mut store = RegistryStore::open(&config.registry_path, config.dimension)
        .with_context(|| {
            format!(
                "failed to load registry {}",
                config.registry_path.display()
            )
        })?;

    let mut session = EnrollmentSession::new(device);
    session
        .submit_details(&store, user_id, display_name)
        .context("enrollment details rejected")?;

    let receipt = capture_with_retries(config, &mut session, analyzer, &mut store)?;
    tracing::info!(
        user_id = %receipt.user_id,
        display_name = %receipt.display_name,
        registry_size = store.registry().len(),
        "user enrolled"
    );

    if config.archive_frames {
        archive_receipt(&config.face_dir, &receipt);
    }
    Ok(receipt)
}

fn capture_with_retries<D, A>(
    config: &AppConfig,
    session: &mut EnrollmentSession<D>,
    analyzer: &mut A,
    store: &mut RegistryStore,
) -> Result<EnrollmentReceipt>
where
    D: CaptureDevice,
    A: FaceAnalyzer,
{
    let mut attempt = 1;
    loop {
        match session.capture(analyzer, store) {
            Ok(receipt) => return Ok(receipt),
            Err(error) if error.is_retryable() && attempt < config.enroll_attempts => {
                tracing::warn!(attempt, %error, "capture rejected, retrying");
                attempt += 1;
            }
            Err(error) => return Err(describe(error)),
        }
    }
}

fn describe(error: EnrollmentError) -> anyhow::Error {
    if error.is_duplicate() {
        return anyhow::Error::new(error).context("choose a different user id");
    }
    if error.is_retryable() {
        return anyhow::Error::new(error).context("capture failed, try again");
    }
    anyhow::Error::new(error).context("enrollment failed")
}

fn archive_receipt(face_dir: &Path, receipt: &EnrollmentReceipt) {
    match archive_frame(
        face_dir,
        &receipt.user_id,
        &receipt.display_name,
        &receipt.frame,
    ) {
        Ok(path) => tracing::info!(path = %path.display(), "enrollment frame archived"),
        Err(error) => tracing::warn!(%error, "failed to archive enrollment frame"),
    }
}

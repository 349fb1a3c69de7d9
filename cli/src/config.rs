use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use visage_core::{DEFAULT_DIMENSION, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_TOLERANCE};

use crate::env_utils::parse_bool_env;

const POLL_INTERVAL_MS_DEFAULT: u64 = 10;
const ENROLL_ATTEMPTS_DEFAULT: u32 = 3;

#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    pub(crate) registry_path: PathBuf,
    pub(crate) face_dir: PathBuf,
    pub(crate) dimension: usize,
    pub(crate) match_tolerance: f32,
    pub(crate) poll_interval_ms: u64,
    pub(crate) max_capture_failures: u32,
    pub(crate) enroll_attempts: u32,
    pub(crate) archive_frames: bool,
}

impl AppConfig {
    pub(crate) fn from_env() -> Result<Self> {
        let registry_path = parse_path("VISAGE_REGISTRY_PATH", "data/face_registry.json")?;
        let face_dir = parse_path("VISAGE_FACE_DIR", "face_data")?;
        let dimension = parse_usize("VISAGE_DIMENSION", DEFAULT_DIMENSION)?;
        let match_tolerance = parse_f32("VISAGE_MATCH_TOLERANCE", DEFAULT_TOLERANCE)?;
        let poll_interval_ms = parse_u64("VISAGE_POLL_INTERVAL_MS", POLL_INTERVAL_MS_DEFAULT)?;
        let max_capture_failures = parse_u32(
            "VISAGE_MAX_CAPTURE_FAILURES",
            DEFAULT_MAX_CONSECUTIVE_FAILURES,
        )?;
        let enroll_attempts = parse_u32("VISAGE_ENROLL_ATTEMPTS", ENROLL_ATTEMPTS_DEFAULT)?;
        let archive_frames = parse_bool_env("VISAGE_ARCHIVE_FRAMES", true)?;

        if dimension == 0 {
            anyhow::bail!("VISAGE_DIMENSION must be > 0");
        }
        if !match_tolerance.is_finite() || match_tolerance < 0.0 {
            anyhow::bail!("VISAGE_MATCH_TOLERANCE must be a finite number >= 0");
        }
        if poll_interval_ms == 0 {
            anyhow::bail!("VISAGE_POLL_INTERVAL_MS must be > 0");
        }
        if enroll_attempts == 0 {
            anyhow::bail!("VISAGE_ENROLL_ATTEMPTS must be > 0");
        }

        Ok(Self {
            registry_path,
            face_dir,
            dimension,
            match_tolerance,
            poll_interval_ms,
            max_capture_failures,
            enroll_attempts,
            archive_frames,
        })
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))
}

fn parse_u32(key: &str, default: u32) -> Result<u32> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))
}

fn parse_f32(key: &str, default: f32) -> Result<f32> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .with_context(|| format!("{key} must be a number, got '{raw}'"))
}

fn parse_path(key: &str, default: &str) -> Result<PathBuf> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    let path = PathBuf::from(raw);
    if path.as_os_str().is_empty() {
        anyhow::bail!("{key} must not be empty");
    }
    Ok(path)
}

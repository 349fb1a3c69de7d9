//! On-disk copies of enrollment frames, kept next to the registry for audit.

use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::capture::Frame;

#[derive(Debug)]
pub enum ArchiveError {
    Io(std::io::Error),
    InvalidFrame { expected: usize, got: usize },
    OversizedFrame { width: u32, height: u32 },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {error}"),
            Self::InvalidFrame { expected, got } => {
                write!(f, "frame buffer holds {got} bytes, expected {expected}")
            }
            Self::OversizedFrame { width, height } => {
                write!(f, "frame of {width}x{height} pixels is too large")
            }
        }
    }
}

impl Error for ArchiveError {}

impl From<std::io::Error> for ArchiveError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Writes `frame` to `<dir>/<user_id>_<display_name>.ppm` and returns the path.
pub fn archive_frame(
    dir: &Path,
    user_id: &str,
    display_name: &str,
    frame: &Frame,
) -> Result<PathBuf, ArchiveError> {
    let Some(expected) = frame.expected_len() else {
        return Err(ArchiveError::OversizedFrame {
            width: frame.width,
            height: frame.height,
        });
    };
    if frame.width == 0 || frame.height == 0 || frame.pixels.len() != expected {
        return Err(ArchiveError::InvalidFrame {
            expected,
            got: frame.pixels.len(),
        });
    }

    fs::create_dir_all(dir)?;
    let file_name = format!(
        "{}_{}.ppm",
        sanitize_component(user_id),
        sanitize_component(display_name)
    );
    let path = dir.join(&file_name);
    let temp_path = dir.join(format!("{file_name}.tmp"));

    let mut file = File::create(&temp_path)?;
    write!(file, "P6\n{} {}\n255\n", frame.width, frame.height)?;
    file.write_all(&frame.pixels)?;
    file.sync_all()?;
    fs::rename(&temp_path, &path)?;
    Ok(path)
}

fn sanitize_component(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

//! Recorded capture sessions standing in for a camera and a face model.
//!
//! A replay directory holds one JSON document per frame, consumed in file
//! name order:
//!
//! ```json
//! { "width": 2, "height": 1, "pixels": [0, 0, 0, 255, 255, 255],
//!   "faces": [ { "bbox": { "top": 0, "right": 1, "bottom": 1, "left": 0 },
//!                "encoding": [0.1, 0.2] } ] }
//! ```
//!
//! `pixels` defaults to a black frame; when present it must hold exactly
//! `width * height * 3` bytes. A face without `encoding` models an
//! extractor that failed on that region.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use visage_core::{rgb8_len, BoundingBox, CaptureDevice, FaceAnalyzer, FeatureVector, Frame};

/// Largest RGB8 buffer a fixture may describe (a 4K frame is ~25 MiB).
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct FixtureFrame {
    width: u32,
    height: u32,
    #[serde(default)]
    pixels: Vec<u8>,
    #[serde(default)]
    faces: Vec<FixtureFace>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureFace {
    bbox: BoundingBox,
    #[serde(default)]
    encoding: Option<FeatureVector>,
}

pub(crate) struct ReplayDevice {
    source: PathBuf,
    frames: VecDeque<Frame>,
    released: bool,
}

impl ReplayDevice {
    pub(crate) fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureDevice for ReplayDevice {
    fn read(&mut self) -> Option<Frame> {
        if self.released {
            return None;
        }
        self.frames.pop_front()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            tracing::debug!(
                source = %self.source.display(),
                unread_frames = self.frames.len(),
                "replay device released"
            );
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ReplayAnalyzer {
    faces: HashMap<u64, Vec<FixtureFace>>,
}

impl FaceAnalyzer for ReplayAnalyzer {
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox> {
        self.faces
            .get(&frame.sequence)
            .map(|faces| faces.iter().map(|face| face.bbox).collect())
            .unwrap_or_default()
    }

    fn encode(&mut self, frame: &Frame, boxes: &[BoundingBox]) -> Vec<FeatureVector> {
        let Some(faces) = self.faces.get(&frame.sequence) else {
            return Vec::new();
        };
        boxes
            .iter()
            .map_while(|bbox| {
                faces
                    .iter()
                    .find(|face| face.bbox == *bbox)
                    .and_then(|face| face.encoding.clone())
            })
            .collect()
    }
}

/// Loads every `*.json` frame in `dir`.
pub(crate) fn open_replay(dir: &Path) -> Result<(ReplayDevice, ReplayAnalyzer)> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read replay directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut frames = VecDeque::with_capacity(paths.len());
    let mut analyzer = ReplayAnalyzer::default();
    for (index, path) in paths.iter().enumerate() {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read replay frame {}", path.display()))?;
        let fixture: FixtureFrame = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid replay frame {}", path.display()))?;

        let sequence = index as u64 + 1;
        let expected = rgb8_len(fixture.width, fixture.height)
            .filter(|len| *len <= MAX_FRAME_BYTES)
            .with_context(|| {
                format!(
                    "replay frame {} is too large: {}x{}",
                    path.display(),
                    fixture.width,
                    fixture.height
                )
            })?;
        let pixels = if fixture.pixels.is_empty() {
            vec![0; expected]
        } else if fixture.pixels.len() == expected {
            fixture.pixels
        } else {
            anyhow::bail!(
                "replay frame {} holds {} pixel bytes, expected {expected}",
                path.display(),
                fixture.pixels.len()
            );
        };
        frames.push_back(Frame::new(sequence, fixture.width, fixture.height, pixels));
        analyzer.faces.insert(sequence, fixture.faces);
    }

    tracing::debug!(source = %dir.display(), frames = frames.len(), "replay loaded");
    let device = ReplayDevice {
        source: dir.to_path_buf(),
        frames,
        released: false,
    };
    Ok((device, analyzer))
}

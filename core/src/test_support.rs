use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::capture::{BoundingBox, CaptureDevice, FaceAnalyzer, Frame};
use crate::vector::FeatureVector;

pub(crate) fn temp_root(prefix: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("visage_{prefix}_{timestamp}"))
}

pub(crate) fn cleanup(root: &Path) {
    if root.exists() {
        fs::remove_dir_all(root).expect("temp directory should be removable");
    }
}

/// Counters observable after the device has moved into a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceProbe {
    pub(crate) reads: Rc<Cell<usize>>,
    pub(crate) releases: Rc<Cell<usize>>,
}

pub(crate) struct ScriptedDevice {
    frames: VecDeque<Option<Frame>>,
    probe: DeviceProbe,
}

impl ScriptedDevice {
    pub(crate) fn new(frames: impl IntoIterator<Item = Option<Frame>>) -> (Self, DeviceProbe) {
        let probe = DeviceProbe::default();
        let device = Self {
            frames: frames.into_iter().collect(),
            probe: probe.clone(),
        };
        (device, probe)
    }
}

impl CaptureDevice for ScriptedDevice {
    fn read(&mut self) -> Option<Frame> {
        self.probe.reads.set(self.probe.reads.get() + 1);
        self.frames.pop_front().flatten()
    }

    fn release(&mut self) {
        self.probe.releases.set(self.probe.releases.get() + 1);
    }
}

pub(crate) fn frame(sequence: u64) -> Frame {
    Frame::new(sequence, 2, 1, vec![0, 0, 0, 255, 255, 255])
}

pub(crate) fn face(left: u32) -> BoundingBox {
    BoundingBox {
        top: 0,
        right: left + 10,
        bottom: 10,
        left,
    }
}

/// Detections keyed by frame sequence; a `None` encoding makes the extractor
/// stop at that face.
#[derive(Debug, Default)]
pub(crate) struct ScriptedAnalyzer {
    faces: HashMap<u64, Vec<(BoundingBox, Option<FeatureVector>)>>,
}

impl ScriptedAnalyzer {
    pub(crate) fn with_faces(
        mut self,
        sequence: u64,
        faces: Vec<(BoundingBox, Option<FeatureVector>)>,
    ) -> Self {
        self.faces.insert(sequence, faces);
        self
    }
}

impl FaceAnalyzer for ScriptedAnalyzer {
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox> {
        self.faces
            .get(&frame.sequence)
            .map(|faces| faces.iter().map(|(bbox, _)| *bbox).collect())
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
                    .find(|(candidate, _)| candidate == bbox)
                    .and_then(|(_, encoding)| encoding.clone())
            })
            .collect()
    }
}

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use vision_plc_bridge::detect::{BoundingBox, ClassNames, Detection, ScriptedBackend};
use vision_plc_bridge::ingest::{FrameSource, SyntheticSource};
use vision_plc_bridge::{CoilWriter, TagValue, TagWriter};

/// Everything a fake peer was asked to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Tag(String, TagValue),
    Coil(u16, bool),
}

/// Tag and coil writer that records into a shared log.
#[derive(Clone, Default)]
pub struct RecordingPeer {
    log: Arc<Mutex<Vec<Write>>>,
    fail_tag: Option<String>,
}

impl RecordingPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write to `tag`.
    pub fn failing_on(tag: &str) -> Self {
        Self {
            log: Arc::default(),
            fail_tag: Some(tag.to_string()),
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.log.lock().unwrap().clone()
    }
}

impl TagWriter for RecordingPeer {
    fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<()> {
        if self.fail_tag.as_deref() == Some(tag) {
            return Err(anyhow!("controller rejected {}", tag));
        }
        self.log
            .lock()
            .unwrap()
            .push(Write::Tag(tag.to_string(), value));
        Ok(())
    }
}

impl CoilWriter for RecordingPeer {
    fn write_coil(&mut self, address: u16, state: bool) -> Result<()> {
        self.log.lock().unwrap().push(Write::Coil(address, state));
        Ok(())
    }
}

pub fn bbox() -> BoundingBox {
    BoundingBox::new(100.0, 120.0, 180.0, 200.0)
}

pub fn detection(label: &str, confidence: f32) -> Detection {
    let class_id = ClassNames::coco()
        .iter()
        .position(|name| name == label)
        .unwrap_or(usize::MAX);
    Detection::new(class_id, label, confidence, bbox())
}

pub fn engine(threshold: f32) -> ScriptedBackend {
    ScriptedBackend::new(ClassNames::coco()).with_threshold(threshold)
}

pub fn source(frames: u64) -> SyntheticSource {
    let mut source = SyntheticSource::new("test", 64, 48).with_limit(frames);
    source.connect().unwrap();
    source
}

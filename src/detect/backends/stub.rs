use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectionEngine;
use crate::detect::labels::ClassNames;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Deterministic backend that replays scripted detections.
///
/// Each call to `detect` pops the next scripted frame; once the script is
/// exhausted the backend repeats `idle` (empty unless set). Detections below
/// the confidence threshold are dropped, as a real model would.
pub struct ScriptedBackend {
    names: ClassNames,
    script: VecDeque<Vec<Detection>>,
    idle: Vec<Detection>,
    confidence_threshold: f32,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(names: ClassNames) -> Self {
        Self {
            names,
            script: VecDeque::new(),
            idle: Vec::new(),
            confidence_threshold: 0.0,
            calls: 0,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Append one frame's worth of detections.
    pub fn then(mut self, detections: Vec<Detection>) -> Self {
        self.script.push_back(detections);
        self
    }

    /// Append `count` frames with no detections.
    pub fn then_empty(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.script.push_back(Vec::new());
        }
        self
    }

    /// Detections returned after the script runs out.
    pub fn idle(mut self, detections: Vec<Detection>) -> Self {
        self.idle = detections;
        self
    }

    /// Build a detection whose label comes from this backend's vocabulary.
    pub fn detection(&self, class_id: usize, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection::new(class_id, self.names.label(class_id), confidence, bbox)
    }

    /// Build a detection for a named class. Unknown names get class id `usize::MAX`.
    pub fn named(&self, label: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        let class_id = self
            .names
            .iter()
            .position(|name| name == label)
            .unwrap_or(usize::MAX);
        Detection::new(class_id, label, confidence, bbox)
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectionEngine for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn vocabulary(&self) -> &ClassNames {
        &self.names
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        let detections = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.idle.clone());
        Ok(detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_idles() -> Result<()> {
        let backend = ScriptedBackend::new(ClassNames::coco()).with_threshold(0.5);
        let apple = backend.named("apple", 0.8, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let faint = backend.named("apple", 0.2, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let mut backend = backend.then(vec![apple.clone(), faint]).then_empty(1);
        let frame = Frame::solid(4, 4, [0, 0, 0], 1);

        assert_eq!(backend.detect(&frame)?, vec![apple]);
        assert!(backend.detect(&frame)?.is_empty());
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[test]
    fn named_detection_uses_vocabulary_index() {
        let backend = ScriptedBackend::new(ClassNames::coco());
        let d = backend.named("apple", 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(d.class_id, 47);
        let d = backend.detection(0, 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(d.label, "person");
    }
}

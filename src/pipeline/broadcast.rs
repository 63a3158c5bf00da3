//! Generic detector: announce every box over UDP.

use anyhow::Result;

use super::FrameHandler;
use crate::detect::Detection;
use crate::frame::Frame;
use crate::overlay::{Overlay, BOX_COLOR};
use crate::transport::{DatagramSink, DetectionEvent};

pub struct BroadcastPipeline<S: DatagramSink> {
    sink: Option<S>,
    sent: u64,
    send_errors: u64,
}

impl<S: DatagramSink> BroadcastPipeline<S> {
    /// With `sink` set to `None` detections are only logged and drawn.
    pub fn new(sink: Option<S>) -> Self {
        Self {
            sink,
            sent: 0,
            send_errors: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }

    fn announce(&mut self, det: &Detection) {
        let event = DetectionEvent::from_detection(det);
        log::info!(
            "Detected {} at ({}, {}) | Confidence: {:.2}",
            event.object,
            event.cx,
            event.cy,
            event.confidence
        );
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let sent = event.to_json().and_then(|payload| sink.send(&payload));
        match sent {
            Ok(()) => self.sent += 1,
            Err(err) => {
                self.send_errors += 1;
                log::warn!("failed to send detection of {}: {:#}", event.object, err);
            }
        }
    }
}

impl<S: DatagramSink> FrameHandler for BroadcastPipeline<S> {
    fn handle(&mut self, _frame: &Frame, detections: &[Detection]) -> Result<Vec<Overlay>> {
        let mut overlays = Vec::with_capacity(detections.len());
        for det in detections {
            self.announce(det);
            overlays.push(Overlay::for_detection(det, BOX_COLOR).with_center());
        }
        Ok(overlays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use anyhow::anyhow;

    struct Unreachable;

    impl DatagramSink for Unreachable {
        fn send(&mut self, _payload: &[u8]) -> Result<()> {
            Err(anyhow!("network unreachable"))
        }
    }

    #[test]
    fn send_errors_do_not_stop_the_frame() -> Result<()> {
        let mut pipeline = BroadcastPipeline::new(Some(Unreachable));
        let frame = Frame::solid(4, 4, [0, 0, 0], 1);
        let dets = vec![
            Detection::new(0, "person", 0.7, BoundingBox::new(0.0, 0.0, 2.0, 2.0)),
            Detection::new(2, "car", 0.4, BoundingBox::new(1.0, 1.0, 3.0, 3.0)),
        ];
        let overlays = pipeline.handle(&frame, &dets)?;
        assert_eq!(overlays.len(), 2);
        assert!(overlays.iter().all(|o| o.mark_center));
        assert_eq!((pipeline.sent(), pipeline.send_errors()), (0, 2));
        Ok(())
    }
}

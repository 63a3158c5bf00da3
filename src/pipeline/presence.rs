//! Presence detector: mirror "anything in view" onto a Modbus coil.

use anyhow::Result;
use chrono::Local;

use super::FrameHandler;
use crate::detect::Detection;
use crate::frame::Frame;
use crate::overlay::{Overlay, BOX_COLOR};
use crate::presence::PresenceTracker;
use crate::transport::CoilWriter;

pub struct PresencePipeline<C: CoilWriter> {
    tracker: PresenceTracker,
    writer: Option<C>,
    coil: u16,
    failed_writes: u64,
}

impl<C: CoilWriter> PresencePipeline<C> {
    /// `writer` is `None` when sending is disabled or the controller was
    /// unreachable at startup; state changes are then only logged.
    pub fn new(writer: Option<C>, coil: u16) -> Self {
        Self {
            tracker: PresenceTracker::new(),
            writer,
            coil,
            failed_writes: 0,
        }
    }

    /// Track presence for one frame; write the coil only on a change.
    pub fn observe(&mut self, present: bool) {
        let Some(state) = self.tracker.update(present) else {
            return;
        };
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let text = if state {
            "Object detected"
        } else {
            "No object detected"
        };
        log::info!("[{}] {}", timestamp, text);

        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        // The new state is kept even if the write fails.
        match writer.write_coil(self.coil, state) {
            Ok(()) => log::info!("PLC updated: Coil {} -> {}", self.coil, u8::from(state)),
            Err(err) => {
                self.failed_writes += 1;
                log::warn!("PLC write error: {:#}", err);
            }
        }
    }

    pub fn state(&self) -> Option<bool> {
        self.tracker.state()
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes
    }

    pub fn writer(&self) -> Option<&C> {
        self.writer.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.close()?;
            log::info!("PLC connection closed.");
        }
        Ok(())
    }
}

impl<C: CoilWriter> FrameHandler for PresencePipeline<C> {
    fn handle(&mut self, _frame: &Frame, detections: &[Detection]) -> Result<Vec<Overlay>> {
        self.observe(!detections.is_empty());
        Ok(detections
            .iter()
            .map(|det| Overlay::for_detection(det, BOX_COLOR).without_label())
            .collect())
    }
}

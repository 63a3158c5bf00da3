//! The detect-then-notify frame loop shared by every relay.
//!
//! One iteration is strictly sequential: poll the quit flag, read a frame,
//! run detection, let the handler notify its peer, render the preview.
//! There is no queueing and no background inference.

pub mod broadcast;
pub mod items;
pub mod presence;

use anyhow::Result;

use crate::detect::{Detection, DetectionEngine};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::overlay::Overlay;
use crate::preview::PreviewSink;
use crate::shutdown::QuitSignal;

pub use broadcast::BroadcastPipeline;
pub use items::{ItemPipeline, ItemTags};
pub use presence::PresencePipeline;

/// Per-application reaction to one frame's detections.
pub trait FrameHandler {
    /// Notify the external peer as needed and return what to draw.
    /// An error stops the loop and is returned to the caller.
    fn handle(&mut self, frame: &Frame, detections: &[Detection]) -> Result<Vec<Overlay>>;
}

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    EndOfStream,
    ReadFailed(String),
    /// The source reported itself unhealthy (e.g. a stalled camera).
    SourceUnhealthy,
    FrameLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub detections: u64,
    pub stop: StopReason,
}

pub struct FrameLoop {
    quit: QuitSignal,
    max_frames: Option<u64>,
}

impl FrameLoop {
    pub fn new(quit: QuitSignal) -> Self {
        Self {
            quit,
            max_frames: None,
        }
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Run until quit, end of stream, a read failure, an unhealthy source or
    /// the frame limit.
    ///
    /// Handler errors propagate. Read failures end the loop normally, as a
    /// camera that stops delivering is the usual way a session ends.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        engine: &mut dyn DetectionEngine,
        handler: &mut dyn FrameHandler,
        preview: &mut dyn PreviewSink,
    ) -> Result<LoopStats> {
        let mut frames = 0u64;
        let mut detections_seen = 0u64;
        let stop = loop {
            if self.quit.is_requested() {
                log::info!("quit requested; exiting loop.");
                break StopReason::Quit;
            }
            if self.max_frames.is_some_and(|max| frames >= max) {
                log::info!("frame limit of {} reached", frames);
                break StopReason::FrameLimit;
            }
            if !source.is_healthy() {
                log::warn!("{} stopped delivering frames; exiting loop.", source.describe());
                break StopReason::SourceUnhealthy;
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("{} reached end of stream", source.describe());
                    break StopReason::EndOfStream;
                }
                Err(err) => {
                    log::warn!("Camera frame could not be read; exiting loop: {:#}", err);
                    break StopReason::ReadFailed(format!("{:#}", err));
                }
            };
            frames += 1;

            let detections = engine.detect(&frame)?;
            detections_seen += detections.len() as u64;
            let overlays = handler.handle(&frame, &detections)?;
            if log::log_enabled!(log::Level::Debug) && !overlays.is_empty() {
                let captions: Vec<String> = overlays.iter().map(Overlay::caption).collect();
                log::debug!("frame {}: {}", frame.sequence, captions.join(", "));
            }
            if let Err(err) = preview.present(&frame, &overlays) {
                log::warn!("preview update failed: {:#}", err);
            }
        };
        Ok(LoopStats {
            frames,
            detections: detections_seen,
            stop,
        })
    }
}

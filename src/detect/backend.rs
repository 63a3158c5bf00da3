use anyhow::Result;
use serde::Deserialize;

use crate::detect::labels::ClassNames;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Execution device requested for inference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceDevice {
    /// Whatever the backend prefers.
    #[default]
    Auto,
    /// Non-accelerated execution only.
    Cpu,
}

impl InferenceDevice {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            other => Err(anyhow::anyhow!(
                "unsupported inference device '{}'; expected auto or cpu",
                other
            )),
        }
    }
}

/// A pretrained detection model.
///
/// Given a frame, returns every object the model reports at or above the
/// engine's confidence threshold, with labels resolved through the engine's
/// vocabulary. Implementations must not retain the frame.
pub trait DetectionEngine: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class-id to name table.
    fn vocabulary(&self) -> &ClassNames;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

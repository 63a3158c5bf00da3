//! Frame ingestion sources.
//!
//! Every relay reads frames from exactly one source, selected by the
//! `camera.source` setting:
//! - `stub://name[?frames=N]` synthetic frames (tests, dry runs)
//! - a local directory of still images, read in file-name order
//! - a V4L2 device, `/dev/videoN` or a bare index `N` (feature: ingest-v4l2)
//!
//! `next_frame` returning `Ok(None)` means the stream ended; an error means
//! the read failed. Either way the frame loop stops.

pub mod file;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::config::CameraSettings;
use crate::frame::Frame;

pub use file::ImageSequenceSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// A camera-like producer of RGB frames.
pub trait FrameSource {
    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool {
        true
    }

    /// Human-readable source name for logs.
    fn describe(&self) -> String;

    /// Release the device. Called once at shutdown.
    fn release(&mut self) {}
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Build (but do not connect) the source named by `camera.source`.
pub fn open_source(camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let source = camera.source.trim();
    if source.is_empty() {
        return Err(anyhow!("camera source must not be empty"));
    }
    if source.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::from_uri(
            source,
            camera.width,
            camera.height,
        )?));
    }
    if source.contains("://") {
        return Err(anyhow!(
            "unsupported camera source '{}' (expected stub://, a directory or a V4L2 device)",
            source
        ));
    }
    let path = Path::new(source);
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::new(path)?));
    }
    if let Some(device) = device_path(source) {
        return open_device(device, camera);
    }
    Err(anyhow!("camera source '{}' not found", source))
}

/// `/dev/videoN` stays as is; a bare index `N` maps to `/dev/videoN`.
pub fn device_path(source: &str) -> Option<String> {
    if source.parse::<u32>().is_ok() {
        return Some(format!("/dev/video{}", source));
    }
    if source.starts_with("/dev/video") {
        return Some(source.to_string());
    }
    None
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(device: String, camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(v4l2::V4l2Config {
        device,
        target_fps: camera.target_fps,
        width: camera.width,
        height: camera.height,
    })))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(device: String, _camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera {} requires the ingest-v4l2 feature",
        device
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(source: &str) -> CameraSettings {
        CameraSettings {
            source: source.to_string(),
            width: 32,
            height: 24,
            target_fps: 30,
        }
    }

    #[test]
    fn bare_index_maps_to_device_node() {
        assert_eq!(device_path("0").as_deref(), Some("/dev/video0"));
        assert_eq!(device_path("/dev/video2").as_deref(), Some("/dev/video2"));
        assert_eq!(device_path("frames/"), None);
    }

    #[test]
    fn stub_uri_opens_synthetic_source() -> Result<()> {
        let mut source = open_source(&camera("stub://bench?frames=2"))?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_network_urls() {
        assert!(open_source(&camera("rtsp://cam/stream")).is_err());
        assert!(open_source(&camera("  ")).is_err());
    }
}

//! V4L2 camera source.
//!
//! Opens a local device node (e.g. `/dev/video0`), asks for RGB3 at the
//! configured size and frame rate, and accepts YUYV when the driver refuses
//! RGB. Captured buffers are normalised to packed RGB24 frames.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::FrameSource;
use crate::frame::Frame;

const MMAP_BUFFERS: u32 = 4;
const MIN_STALL_GRACE_MS: u64 = 2_000;

#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device node, e.g. `/dev/video0`.
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[self_referencing]
struct Capturing {
    device: Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, Device>,
}

/// Negotiated capture geometry.
#[derive(Clone, Copy, Debug)]
struct Negotiated {
    width: u32,
    height: u32,
    format: PixelFormat,
}

pub struct V4l2Source {
    config: V4l2Config,
    capture: Option<Capturing>,
    negotiated: Option<Negotiated>,
    frames: u64,
    last_frame_at: Option<Instant>,
    failed: Option<String>,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            config,
            capture: None,
            negotiated: None,
            frames: 0,
            last_frame_at: None,
            failed: None,
        }
    }

    fn stall_grace(&self) -> Duration {
        let per_frame_ms = match self.config.target_fps {
            0 => 0,
            fps => u64::from(1000 / fps) * 6,
        };
        Duration::from_millis(per_frame_ms.max(MIN_STALL_GRACE_MS))
    }
}

/// Ask for RGB3, fall back to YUYV, and report what the driver settled on.
fn negotiate(device: &Device, config: &V4l2Config) -> Result<Negotiated> {
    let mut wanted = device.format().context("read camera format")?;
    wanted.width = config.width;
    wanted.height = config.height;

    let mut granted = None;
    for fourcc in [b"RGB3", b"YUYV"] {
        wanted.fourcc = FourCC::new(fourcc);
        match device.set_format(&wanted) {
            Ok(format) if PixelFormat::from_fourcc(&format.fourcc.repr).is_some() => {
                granted = Some(format);
                break;
            }
            Ok(format) => log::debug!("{} offered {} instead", config.device, format.fourcc),
            Err(err) => log::debug!("{} rejected {}: {}", config.device, wanted.fourcc, err),
        }
    }
    let format = match granted {
        Some(format) => format,
        None => device.format().context("read camera format")?,
    };
    let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
        anyhow!(
            "camera {} delivers unsupported pixel format {}",
            config.device,
            format.fourcc
        )
    })?;

    if config.target_fps > 0 {
        let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!("{}: frame rate {} not accepted: {}", config.device, config.target_fps, err);
        }
    }

    Ok(Negotiated {
        width: format.width,
        height: format.height,
        format: pixel_format,
    })
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        let device = Device::with_path(&self.config.device)
            .with_context(|| format!("Could not open camera {}", self.config.device))?;
        let negotiated = negotiate(&device, &self.config)?;

        let capture = CapturingBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("map camera buffers"))
            },
        }
        .try_build()
        .inspect_err(|err| self.failed = Some(err.to_string()))?;

        self.capture = Some(capture);
        self.negotiated = Some(negotiated);
        self.failed = None;
        log::info!(
            "camera {} streaming {}x{} {:?}",
            self.config.device,
            negotiated.width,
            negotiated.height,
            negotiated.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let (Some(capture), Some(negotiated)) = (self.capture.as_mut(), self.negotiated) else {
            return Err(anyhow!("camera {} is not connected", self.config.device));
        };
        let raw = capture
            .with_stream_mut(|stream| stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|err| {
                self.failed = Some(err.to_string());
                anyhow::Error::new(err).context("Failed to grab frame")
            })?;

        let rgb = normalize_to_rgb(&raw, negotiated.width, negotiated.height, negotiated.format)?;
        self.frames += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::from_rgb(rgb, negotiated.width, negotiated.height, self.frames).map(Some)
    }

    fn is_healthy(&self) -> bool {
        if self.failed.is_some() {
            return false;
        }
        self.last_frame_at
            .map_or(true, |at| at.elapsed() <= self.stall_grace())
    }

    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn release(&mut self) {
        if self.capture.take().is_some() {
            log::info!("camera {} released", self.config.device);
        }
    }
}

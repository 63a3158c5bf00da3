use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::frame::Frame;

/// Generated frames for `stub://` sources.
///
/// `stub://name?frames=N` ends the stream after `N` frames; without the
/// query the stream is endless.
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    limit: Option<u64>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            limit: None,
            frame_count: 0,
            connected: false,
        }
    }

    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn from_uri(uri: &str, width: u32, height: u32) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a stub source: {}", uri))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };
        let mut source = Self::new(name, width, height);
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some(("frames", value)) => {
                        let frames = value
                            .parse()
                            .map_err(|_| anyhow!("invalid frame limit '{}' in {}", value, uri))?;
                        source = source.with_limit(frames);
                    }
                    _ => return Err(anyhow!("unknown stub option '{}' in {}", pair, uri)),
                }
            }
        }
        Ok(source)
    }

    /// A moving gradient, so consecutive frames differ.
    fn pixels(&self) -> Vec<u8> {
        let len = (self.width as usize) * (self.height as usize) * 3;
        (0..len)
            .map(|i| ((i as u64 + self.frame_count) % 256) as u8)
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to stub://{}", self.name);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("stub://{} not connected", self.name));
        }
        if self.limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.pixels();
        Frame::from_rgb(pixels, self.width, self.height, self.frame_count).map(Some)
    }

    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn release(&mut self) {
        self.connected = false;
    }
}

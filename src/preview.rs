//! Where annotated frames go: nowhere, or a periodically refreshed JPEG.

use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::{Path, PathBuf};

use crate::config::PreviewSettings;
use crate::frame::Frame;
use crate::overlay::{draw_overlays, Overlay};

pub trait PreviewSink {
    fn present(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Headless mode.
#[derive(Debug, Default)]
pub struct NullPreview;

impl PreviewSink for NullPreview {
    fn present(&mut self, _frame: &Frame, _overlays: &[Overlay]) -> Result<()> {
        Ok(())
    }
}

/// Writes an annotated snapshot every `every_n` frames. The file is replaced
/// by rename so readers never see a partial image.
#[derive(Debug)]
pub struct JpegPreview {
    path: PathBuf,
    tmp_path: PathBuf,
    every_n: u32,
    presented: u64,
    written: u64,
}

impl JpegPreview {
    pub fn new(path: impl Into<PathBuf>, every_n: u32) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "preview.jpg".into());
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Ok(Self {
            path,
            tmp_path,
            every_n: every_n.max(1),
            presented: 0,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshots written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl PreviewSink for JpegPreview {
    fn present(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<()> {
        self.presented += 1;
        if (self.presented - 1) % u64::from(self.every_n) != 0 {
            return Ok(());
        }
        let mut image = frame.to_image()?;
        draw_overlays(&mut image, overlays);
        image
            .save_with_format(&self.tmp_path, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write preview {}", self.tmp_path.display()))?;
        std::fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("failed to replace preview {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.tmp_path.exists() {
            std::fs::remove_file(&self.tmp_path).ok();
        }
        log::info!(
            "preview closed after {} snapshot(s) at {}",
            self.written,
            self.path.display()
        );
        Ok(())
    }
}

pub fn open_preview(settings: &PreviewSettings) -> Result<Box<dyn PreviewSink>> {
    match &settings.path {
        Some(path) => {
            log::info!(
                "writing annotated preview to {} every {} frame(s)",
                path.display(),
                settings.every_n_frames
            );
            Ok(Box::new(JpegPreview::new(path, settings.every_n_frames)?))
        }
        None => Ok(Box::new(NullPreview)),
    }
}

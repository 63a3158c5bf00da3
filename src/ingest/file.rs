//! Local still-image frame source.
//!
//! `ImageSequenceSource` replays the images in a directory (sorted by file
//! name) as consecutive frames, then reports end of stream. Files with an
//! extension the `image` crate cannot decode are skipped at connect time.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn connect(&mut self) -> Result<()> {
        self.files = list_images(&self.dir)?;
        self.cursor = 0;
        if self.files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        log::info!(
            "ImageSequenceSource: {} image(s) in {}",
            self.files.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?
            .to_rgb8();
        self.frame_count += 1;
        Ok(Some(Frame::from_image(image, self.frame_count)))
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn replays_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 3, image::Rgb([200, 0, 0])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 200])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = ImageSequenceSource::new(dir.path())?;
        source.connect()?;
        assert_eq!(source.len(), 2);

        let first = source.next_frame()?.ok_or_else(|| anyhow!("missing frame"))?;
        assert_eq!((first.width, first.height, first.sequence), (2, 2, 1));
        let second = source.next_frame()?.ok_or_else(|| anyhow!("missing frame"))?;
        assert_eq!((second.width, second.height), (4, 3));
        assert_eq!(&second.pixels()[..3], &[200, 0, 0]);
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = ImageSequenceSource::new(dir.path())?;
        assert!(source.connect().is_err());
        Ok(())
    }
}

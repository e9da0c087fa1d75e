#![cfg(feature = "ingest-image")]

//! Local image directory source.
//!
//! Replays still images (JPEG/PNG) from a local directory as camera frames,
//! in file-name order. No network access; files are decoded in memory.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::capture::CaptureThread;
use super::FrameSource;
use crate::frame::{Frame, PixelFormat, Rotation};
use crate::pipeline::FrameSink;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    pub target_fps: u32,
    /// Rotation reported with every frame.
    pub rotation: Rotation,
    /// Start over after the last image instead of stopping.
    pub repeat: bool,
}

pub struct DirectorySource {
    config: DirectoryConfig,
    name: String,
    images: Vec<PathBuf>,
    capture: Option<CaptureThread>,
}

impl DirectorySource {
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let images = list_images(&config.path)?;
        if images.is_empty() {
            return Err(anyhow!(
                "no {} images in {}",
                IMAGE_EXTENSIONS.join("/"),
                config.path.display()
            ));
        }
        Ok(Self {
            name: config.path.display().to_string(),
            config,
            images,
            capture: None,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl FrameSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, sink: FrameSink) -> Result<()> {
        if let Some(previous) = self.capture.take() {
            previous.stop()?;
        }
        let images = self.images.clone();
        let repeat = self.config.repeat;
        let rotation = self.config.rotation;
        let mut next = 0usize;
        self.capture = Some(CaptureThread::spawn(
            &self.name,
            self.config.target_fps,
            sink,
            move || {
                if next >= images.len() {
                    if !repeat {
                        return Ok(None);
                    }
                    next = 0;
                }
                let path = &images[next];
                next += 1;
                load_frame(path, rotation).map(Some)
            },
        )?);
        log::info!(
            "DirectorySource: bound {} ({} images)",
            self.name,
            self.images.len()
        );
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        if let Some(capture) = self.capture.take() {
            capture.stop()?;
            log::info!("DirectorySource: unbound {}", self.name);
        }
        Ok(())
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read image directory {}", dir.display()))?;
    let mut images = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn load_frame(path: &Path, rotation: Rotation) -> Result<Frame> {
    let image = image::open(path).with_context(|| format!("decode {}", path.display()))?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(rgb.into_raw(), width, height, PixelFormat::Rgb24, rotation)
}

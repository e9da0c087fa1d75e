//! Synthetic camera for `stub://` URIs.
//!
//! Produces a static scene that changes every `SCENE_FRAMES` frames, so
//! hash-based stub detection yields stable labels between scene cuts.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::capture::CaptureThread;
use super::FrameSource;
use crate::frame::{Frame, PixelFormat, Rotation};
use crate::pipeline::FrameSink;

const SCENE_FRAMES: u64 = 50;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URI (e.g., "stub://camera").
    pub url: String,
    /// Frames per second delivered to the pipeline.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Sensor rotation reported with every frame.
    pub rotation: Rotation,
    pub format: PixelFormat,
    /// Seed for scene generation.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            rotation: Rotation::Deg90,
            format: PixelFormat::Rgba8888,
            seed: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    capture: Option<CaptureThread>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!("synthetic source requires a stub:// URI"));
        }
        if config.target_fps == 0 {
            return Err(anyhow!("target fps must be >= 1"));
        }
        config
            .format
            .frame_len(config.width, config.height)
            .filter(|len| *len > 0)
            .ok_or_else(|| anyhow!("invalid synthetic frame size"))?;
        Ok(Self {
            config,
            capture: None,
        })
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn bind(&mut self, sink: FrameSink) -> Result<()> {
        if let Some(previous) = self.capture.take() {
            previous.stop()?;
        }
        let mut scene = SceneGenerator::new(self.config.clone());
        self.capture = Some(CaptureThread::spawn(
            &self.config.url,
            self.config.target_fps,
            sink,
            move || scene.next_frame().map(Some),
        )?);
        log::info!("SyntheticSource: bound {} (synthetic)", self.config.url);
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        if let Some(capture) = self.capture.take() {
            capture.stop()?;
            log::info!("SyntheticSource: unbound {}", self.config.url);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Scene generation
// ----------------------------------------------------------------------------

struct SceneGenerator {
    config: SyntheticConfig,
    frame_count: u64,
    scene_offset: u8,
    rng: StdRng,
}

impl SceneGenerator {
    fn new(config: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let scene_offset = rng.gen();
        Self {
            config,
            frame_count: 0,
            scene_offset,
            rng,
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        if self.frame_count % SCENE_FRAMES == 0 {
            self.scene_offset = self.rng.gen();
        }
        Frame::new(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            self.config.format,
            self.config.rotation,
        )
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize;
        let shade = |i: usize| ((i as u64 + self.scene_offset as u64) % 256) as u8;
        match self.config.format {
            PixelFormat::Rgb24 => (0..pixel_count * 3).map(shade).collect(),
            PixelFormat::Rgba8888 => (0..pixel_count)
                .flat_map(|i| [shade(i * 3), shade(i * 3 + 1), shade(i * 3 + 2), 255])
                .collect(),
            PixelFormat::Nv12 => {
                let mut pixels: Vec<u8> = (0..pixel_count).map(shade).collect();
                pixels.resize(pixel_count + pixel_count / 2, 128);
                pixels
            }
        }
    }
}

//! Camera frame ownership.
//!
//! - `Frame`: one captured image plus orientation metadata. Pixels are private,
//!   there is no `Clone`, and the frame is consumed by value when detection runs.
//! - `ReleaseHook`: the capture layer's "close image" callback. It fires exactly
//!   once, when the frame is dropped, whether detection succeeded or failed.
//! - `RgbImage`: upright, tightly packed RGB24 pixels handed to a detector backend.

use anyhow::{anyhow, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Callback invoked with the frame sequence number when the frame is released.
pub type ReleaseHook = Box<dyn FnOnce(u64) + Send>;

// ----------------------------------------------------------------------------
// PixelFormat / Rotation
// ----------------------------------------------------------------------------

/// Pixel layouts a frame source may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    /// Android `ARGB_8888` bitmaps are laid out as RGBA in memory.
    Rgba8888,
    Nv12,
}

impl PixelFormat {
    /// Expected buffer length for a `width` x `height` frame.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Rgba8888 => pixels.checked_mul(4),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        }
    }
}

/// Clockwise rotation needed to present the frame upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse sensor rotation metadata. Any multiple of 90 is accepted and wrapped.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(anyhow!(
                "rotation must be a multiple of 90 degrees, got {}",
                degrees
            ));
        }
        Ok(match degrees.rem_euclid(360) {
            0 => Rotation::Deg0,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            _ => Rotation::Deg270,
        })
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One camera frame. Owned by the source until handed to the pipeline,
/// then owned by the detector engine until detection returns.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
    sequence: u64,
    captured_at: Instant,
    release: Option<ReleaseHook>,
}

// Explicitly NOT implementing Clone: a frame is consumed exactly once.

impl Frame {
    /// Create a frame, validating the buffer length against the pixel format.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        rotation: Rotation,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = format
            .frame_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                format,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            rotation,
            sequence: 0,
            captured_at: Instant::now(),
            release: None,
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Attach the capture layer's release callback.
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub(crate) fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("rotation", &self.rotation)
            .finish_non_exhaustive()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.sequence);
        }
    }
}

// ----------------------------------------------------------------------------
// RgbImage
// ----------------------------------------------------------------------------

/// Upright RGB24 image, the only pixel form detector backends receive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = PixelFormat::Rgb24
            .frame_len(width, height)
            .ok_or_else(|| anyhow!("image dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Internal: callers guarantee `pixels.len() == width * height * 3`.
    pub(crate) fn from_parts(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn rotation_parses_multiples_of_ninety() {
        assert_eq!(Rotation::from_degrees(0).unwrap(), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(270).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Deg90);
        assert!(Rotation::from_degrees(45).is_err());
        assert_eq!(Rotation::from_degrees(-180).unwrap().degrees(), 180);
    }

    #[test]
    fn frame_rejects_length_mismatch() {
        assert!(Frame::new(vec![0u8; 11], 2, 2, PixelFormat::Rgb24, Rotation::Deg0).is_err());
        assert!(Frame::new(vec![0u8; 16], 2, 2, PixelFormat::Rgba8888, Rotation::Deg0).is_ok());
        assert!(Frame::new(vec![0u8; 6], 2, 2, PixelFormat::Nv12, Rotation::Deg0).is_ok());
        assert!(Frame::new(Vec::new(), 0, 2, PixelFormat::Rgb24, Rotation::Deg0).is_err());
    }

    #[test]
    fn release_hook_fires_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let frame = Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb24, Rotation::Deg0)
            .unwrap()
            .with_sequence(7)
            .with_release_hook(Box::new(move |seq| {
                assert_eq!(seq, 7);
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(frame);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}

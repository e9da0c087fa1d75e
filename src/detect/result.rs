use crate::detect::error::{DetectorError, InitError};
use crate::detect::settings::Delegate;

/// Label shown when the latest frame produced no detections or failed.
pub const NOTHING_LABEL: &str = "Nothing";

/// Axis-aligned box in upright image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            bounding_box: None,
        }
    }

    pub fn with_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }
}

/// Result of running detection on one frame.
///
/// Detections are sorted by descending confidence, filtered by the settings
/// threshold and capped at the settings result limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub inference_time_ms: u64,
    /// Upright image height at detection time.
    pub image_height: u32,
    /// Upright image width at detection time.
    pub image_width: u32,
    pub frame_sequence: u64,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn top(&self) -> Option<&Detection> {
        self.detections.first()
    }

    /// Human-readable label for presentation.
    pub fn label(&self) -> &str {
        self.top()
            .map(|detection| detection.label.as_str())
            .unwrap_or(NOTHING_LABEL)
    }
}

/// Outcome of one detection cycle, delivered to pipeline listeners.
#[derive(Clone, Debug)]
pub enum DetectorEvent {
    Results(DetectionResult),
    Error(DetectorError),
    /// The model was loaded on `used` instead of the requested delegate.
    Fallback {
        requested: Delegate,
        used: Delegate,
        reason: InitError,
    },
}

impl DetectorEvent {
    pub fn label(&self) -> &str {
        match self {
            DetectorEvent::Results(result) => result.label(),
            DetectorEvent::Error(_) | DetectorEvent::Fallback { .. } => NOTHING_LABEL,
        }
    }
}

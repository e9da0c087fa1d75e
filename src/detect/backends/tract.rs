#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::error::InitError;
use crate::detect::result::{BoundingBox, Detection};
use crate::detect::settings::{Delegate, DetectorSettings};
use crate::frame::RgbImage;

pub const SSD_INPUT_SIZE: u32 = 300;

type SsdPlan = TypedRunnableModel<TypedModel>;

/// Tract-based backend for SSD MobileNet style ONNX detectors.
///
/// The model takes a `[1, H, W, 3]` u8 image and produces the usual four
/// post-processed outputs: boxes `[1, N, 4]` as normalized
/// `(ymin, xmin, ymax, xmax)`, classes `[1, N]`, scores `[1, N]` and a count.
/// Tract runs on the CPU only; other delegates are reported as unsupported.
pub struct TractBackend {
    model: Option<SsdPlan>,
    labels: Vec<String>,
    input_width: u32,
    input_height: u32,
}

impl TractBackend {
    pub fn new() -> Self {
        Self::with_input_size(SSD_INPUT_SIZE, SSD_INPUT_SIZE)
    }

    pub fn with_input_size(input_width: u32, input_height: u32) -> Self {
        Self {
            model: None,
            labels: Vec::new(),
            input_width,
            input_height,
        }
    }

    fn load_model(&self, model_path: &Path) -> Result<SsdPlan> {
        tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(
                        1,
                        self.input_height as usize,
                        self.input_width as usize,
                        3
                    ),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    /// Nearest-neighbour resize into the model's NHWC u8 input.
    fn build_input(&self, image: &RgbImage) -> Tensor {
        let in_w = self.input_width as usize;
        let in_h = self.input_height as usize;
        let src_w = image.width() as usize;
        let src_h = image.height() as usize;
        let pixels = image.pixels();
        tract_ndarray::Array4::from_shape_fn((1, in_h, in_w, 3), |(_, y, x, channel)| {
            let sy = y * src_h / in_h;
            let sx = x * src_w / in_w;
            pixels[(sy * src_w + sx) * 3 + channel]
        })
        .into_tensor()
    }

    fn label_for(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class_id))
    }

    fn decode_outputs(&self, outputs: &[TValue], image: &RgbImage) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "expected boxes, classes and scores outputs, model produced {}",
                outputs.len()
            ));
        }
        let boxes = outputs[0].cast_to::<f32>().context("boxes output")?;
        let classes = outputs[1].cast_to::<f32>().context("classes output")?;
        let scores = outputs[2].cast_to::<f32>().context("scores output")?;
        let boxes = boxes.as_slice::<f32>()?;
        let classes = classes.as_slice::<f32>()?;
        let scores = scores.as_slice::<f32>()?;

        let mut count = scores.len().min(classes.len()).min(boxes.len() / 4);
        if let Some(num) = outputs.get(3) {
            let num = num.cast_to::<f32>().context("count output")?;
            if let Some(n) = num.as_slice::<f32>()?.first() {
                count = count.min(n.max(0.0) as usize);
            }
        }

        let width = image.width() as f32;
        let height = image.height() as f32;
        Ok((0..count)
            .filter(|&i| scores[i].is_finite())
            .map(|i| {
                let b = &boxes[i * 4..i * 4 + 4];
                Detection::new(self.label_for(classes[i] as usize), scores[i]).with_box(
                    BoundingBox {
                        left: b[1] * width,
                        top: b[0] * height,
                        right: b[3] * width,
                        bottom: b[2] * height,
                    },
                )
            })
            .collect())
    }
}

impl Default for TractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports_delegate(&self, delegate: Delegate) -> bool {
        matches!(delegate, Delegate::Cpu)
    }

    fn load(&mut self, settings: &DetectorSettings) -> std::result::Result<(), InitError> {
        if !self.supports_delegate(settings.delegate()) {
            return Err(InitError::DelegateUnsupported(settings.delegate()));
        }
        let model_path = settings.model_path();
        if !model_path.is_file() {
            return Err(InitError::ModelMissing(model_path.to_path_buf()));
        }
        if settings.num_threads() > 1 {
            log::debug!(
                "tract runs single-threaded; ignoring num_threads={}",
                settings.num_threads()
            );
        }
        let model = self
            .load_model(model_path)
            .map_err(|e| InitError::ModelInvalid(format!("{:#}", e)))?;
        self.labels = match settings.labels_path() {
            Some(path) => read_labels(path).map_err(|e| InitError::Backend(format!("{:#}", e)))?,
            None => Vec::new(),
        };
        self.model = Some(model);
        Ok(())
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract backend used before load"))?;
        let input = self.build_input(image);
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_outputs(&outputs, image)
    }
}

/// One label per line; the line index is the class id.
fn read_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    Ok(raw.lines().map(|line| line.trim().to_string()).collect())
}

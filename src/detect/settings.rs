use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NUM_THREADS: usize = 2;
pub const DEFAULT_MAX_RESULTS: usize = 3;
pub const DEFAULT_MODEL_PATH: &str = "models/lite-model_ssd_mobilenet_v1_1_metadata_2.onnx";

/// Hardware backend used to run inference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    #[default]
    Cpu,
    Gpu,
    Nnapi,
}

impl Delegate {
    pub fn as_str(self) -> &'static str {
        match self {
            Delegate::Cpu => "cpu",
            Delegate::Gpu => "gpu",
            Delegate::Nnapi => "nnapi",
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Delegate {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Delegate::Cpu),
            "gpu" => Ok(Delegate::Gpu),
            "nnapi" => Ok(Delegate::Nnapi),
            other => Err(anyhow!(
                "unknown delegate '{}' (expected cpu, gpu or nnapi)",
                other
            )),
        }
    }
}

/// Immutable detector configuration, created once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    confidence_threshold: f32,
    num_threads: usize,
    max_results: usize,
    delegate: Delegate,
    model_path: PathBuf,
    labels_path: Option<PathBuf>,
}

impl DetectorSettings {
    pub fn new(
        confidence_threshold: f32,
        num_threads: usize,
        max_results: usize,
        delegate: Delegate,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                confidence_threshold
            ));
        }
        if num_threads == 0 {
            return Err(anyhow!("thread count must be positive"));
        }
        if max_results == 0 {
            return Err(anyhow!("max results must be positive"));
        }
        Ok(Self {
            confidence_threshold,
            num_threads,
            max_results,
            delegate,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: None,
        })
    }

    pub fn with_model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_labels_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.labels_path = Some(path.into());
        self
    }

    /// Same settings on a different delegate. Used for CPU fallback.
    pub(crate) fn on_delegate(&self, delegate: Delegate) -> Self {
        Self {
            delegate,
            ..self.clone()
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn delegate(&self) -> Delegate {
        self.delegate
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn labels_path(&self) -> Option<&Path> {
        self.labels_path.as_deref()
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_THRESHOLD,
            num_threads: DEFAULT_NUM_THREADS,
            max_results: DEFAULT_MAX_RESULTS,
            delegate: Delegate::Cpu,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_values() {
        assert!(DetectorSettings::new(1.5, 2, 3, Delegate::Cpu).is_err());
        assert!(DetectorSettings::new(-0.1, 2, 3, Delegate::Cpu).is_err());
        assert!(DetectorSettings::new(0.5, 0, 3, Delegate::Cpu).is_err());
        assert!(DetectorSettings::new(0.5, 2, 0, Delegate::Cpu).is_err());
        assert!(DetectorSettings::new(f32::NAN, 2, 3, Delegate::Cpu).is_err());
    }

    #[test]
    fn boundary_thresholds_are_valid() {
        assert!(DetectorSettings::new(0.0, 1, 1, Delegate::Gpu).is_ok());
        assert!(DetectorSettings::new(1.0, 1, 1, Delegate::Nnapi).is_ok());
    }

    #[test]
    fn delegate_parses_case_insensitively() {
        assert_eq!("GPU".parse::<Delegate>().unwrap(), Delegate::Gpu);
        assert_eq!(" nnapi ".parse::<Delegate>().unwrap(), Delegate::Nnapi);
        assert!("tpu".parse::<Delegate>().is_err());
    }

    #[test]
    fn cpu_fallback_keeps_everything_else() {
        let settings = DetectorSettings::new(0.7, 4, 5, Delegate::Gpu)
            .unwrap()
            .with_model_path("model.onnx");
        let cpu = settings.on_delegate(Delegate::Cpu);
        assert_eq!(cpu.delegate(), Delegate::Cpu);
        assert_eq!(cpu.confidence_threshold(), 0.7);
        assert_eq!(cpu.max_results(), 5);
        assert_eq!(cpu.model_path(), Path::new("model.onnx"));
    }
}

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{
    Delegate, DetectorSettings, DEFAULT_MAX_RESULTS, DEFAULT_MODEL_PATH, DEFAULT_NUM_THREADS,
    DEFAULT_THRESHOLD,
};

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_SOURCE_URI: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_ROTATION_DEGREES: i32 = 90;

pub const CONFIG_ENV: &str = "PEDESTRIAN_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AssistantConfigFile {
    detector: Option<DetectorConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    threshold: Option<f32>,
    num_threads: Option<usize>,
    max_results: Option<usize>,
    delegate: Option<Delegate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    rotation_degrees: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Name of the detector backend in the `BackendRegistry`.
    pub backend: String,
    pub detector: DetectorSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: i32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_SOURCE_URI.to_string(),
            target_fps: DEFAULT_SOURCE_FPS,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
            rotation_degrees: DEFAULT_ROTATION_DEGREES,
        }
    }
}

/// Detector fields before validation; `DetectorSettings` is immutable once built.
#[derive(Debug, Clone)]
struct DetectorFields {
    model_path: PathBuf,
    labels_path: Option<PathBuf>,
    threshold: f32,
    num_threads: usize,
    max_results: usize,
    delegate: Delegate,
}

impl AssistantConfig {
    /// Load from `PEDESTRIAN_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (JSON, or TOML for `.toml`), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AssistantConfigFile::default(),
        };
        let (backend, mut fields, mut source) = Self::from_file(file_cfg);
        apply_env(&mut fields, &mut source)?;
        let backend = env_override("PEDESTRIAN_BACKEND").unwrap_or(backend);
        Self::validate(backend, fields, source)
    }

    fn from_file(file: AssistantConfigFile) -> (String, DetectorFields, SourceSettings) {
        let detector = file.detector.unwrap_or_default();
        let backend = detector
            .backend
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        let fields = DetectorFields {
            model_path: detector
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            labels_path: detector.labels_path,
            threshold: detector.threshold.unwrap_or(DEFAULT_THRESHOLD),
            num_threads: detector.num_threads.unwrap_or(DEFAULT_NUM_THREADS),
            max_results: detector.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            delegate: detector.delegate.unwrap_or_default(),
        };
        let source_file = file.source.unwrap_or_default();
        let defaults = SourceSettings::default();
        let source = SourceSettings {
            uri: source_file.uri.unwrap_or(defaults.uri),
            target_fps: source_file.target_fps.unwrap_or(defaults.target_fps),
            width: source_file.width.unwrap_or(defaults.width),
            height: source_file.height.unwrap_or(defaults.height),
            rotation_degrees: source_file
                .rotation_degrees
                .unwrap_or(defaults.rotation_degrees),
        };
        (backend, fields, source)
    }

    fn validate(backend: String, fields: DetectorFields, source: SourceSettings) -> Result<Self> {
        if backend.trim().is_empty() {
            return Err(anyhow!("detector backend name must not be empty"));
        }
        let mut detector = DetectorSettings::new(
            fields.threshold,
            fields.num_threads,
            fields.max_results,
            fields.delegate,
        )?
        .with_model_path(fields.model_path);
        if let Some(labels) = fields.labels_path {
            detector = detector.with_labels_path(labels);
        }

        if source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be >= 1"));
        }
        if source.width == 0 || source.height == 0 {
            return Err(anyhow!("source width and height must be non-zero"));
        }
        if source.rotation_degrees % 90 != 0 {
            return Err(anyhow!(
                "source rotation_degrees must be a multiple of 90, got {}",
                source.rotation_degrees
            ));
        }

        Ok(Self {
            backend,
            detector,
            source,
        })
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            detector: DetectorSettings::default(),
            source: SourceSettings::default(),
        }
    }
}

fn apply_env(fields: &mut DetectorFields, source: &mut SourceSettings) -> Result<()> {
    if let Some(path) = env_override("PEDESTRIAN_MODEL_PATH") {
        fields.model_path = PathBuf::from(path);
    }
    if let Some(path) = env_override("PEDESTRIAN_LABELS_PATH") {
        fields.labels_path = Some(PathBuf::from(path));
    }
    if let Some(value) = env_override("PEDESTRIAN_THRESHOLD") {
        fields.threshold = value
            .parse()
            .map_err(|_| anyhow!("PEDESTRIAN_THRESHOLD must be a number between 0 and 1"))?;
    }
    if let Some(value) = env_override("PEDESTRIAN_NUM_THREADS") {
        fields.num_threads = value
            .parse()
            .map_err(|_| anyhow!("PEDESTRIAN_NUM_THREADS must be a positive integer"))?;
    }
    if let Some(value) = env_override("PEDESTRIAN_MAX_RESULTS") {
        fields.max_results = value
            .parse()
            .map_err(|_| anyhow!("PEDESTRIAN_MAX_RESULTS must be a positive integer"))?;
    }
    if let Some(value) = env_override("PEDESTRIAN_DELEGATE") {
        fields.delegate = value.parse::<Delegate>().context("PEDESTRIAN_DELEGATE")?;
    }
    if let Some(uri) = env_override("PEDESTRIAN_SOURCE") {
        source.uri = uri;
    }
    Ok(())
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<AssistantConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: AssistantConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

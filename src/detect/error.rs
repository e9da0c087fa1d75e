use std::path::PathBuf;
use thiserror::Error;

use crate::detect::settings::Delegate;

/// Model or delegate failed to load.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InitError {
    #[error("model file not found: {0}")]
    ModelMissing(PathBuf),

    #[error("model file is invalid: {0}")]
    ModelInvalid(String),

    #[error("{0} delegate is not supported on this device")]
    DelegateUnsupported(Delegate),

    #[error("detector backend failed to initialize: {0}")]
    Backend(String),
}

/// Failure of one detection cycle.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DetectorError {
    /// Engine could not be initialized; detection was skipped.
    #[error("detector not initialized: {0}")]
    Init(#[from] InitError),

    /// The frame could not be converted for inference (malformed buffer).
    #[error("frame rejected: {0}")]
    Frame(String),

    /// The backend failed while running inference on a valid frame.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl DetectorError {
    /// Transient errors affect a single frame; the engine stays usable.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DetectorError::Init(_))
    }
}

mod backend;
pub mod backends;
mod engine;
mod error;
mod registry;
mod result;
mod settings;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use engine::{DetectorEngine, EngineState, InitReport};
pub use error::{DetectorError, InitError};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, DetectionResult, DetectorEvent, NOTHING_LABEL};
pub use settings::{
    Delegate, DetectorSettings, DEFAULT_MAX_RESULTS, DEFAULT_MODEL_PATH, DEFAULT_NUM_THREADS,
    DEFAULT_THRESHOLD,
};

//! Pedestrian Assistant
//!
//! On-device object detection over a live camera stream, tied to the host's
//! visibility lifecycle.
//!
//! # Architecture
//!
//! ```text
//!   FrameSource --push--> FrameSink --> [latest-frame slot] --> worker
//!                                                              |
//!                                     DetectorEngine::detect <--+
//!                                                              |
//!                            PresentationState::publish <------+
//! ```
//!
//! - At most one detection runs at a time; while it runs, only the newest
//!   pending frame is kept and older ones are released unprocessed.
//! - Frames are consumed by `detect`; each frame's release hook fires exactly
//!   once, whatever the outcome.
//! - Pausing unbinds the source immediately. A detection still running at
//!   that point completes, but its outcome never reaches the presentation.
//!
//! # Module Structure
//!
//! - `frame`: camera frames, pixel formats, rotation metadata
//! - `detect`: detector settings, engine adapter, backends, results
//! - `ingest`: frame sources (push, synthetic, image directory)
//! - `pipeline`: lifecycle orchestration and backpressure
//! - `presentation`: the observable label and latest outcome
//! - `config`: file + environment configuration for the CLI

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod presentation;
pub mod ui;

pub use config::{AssistantConfig, SourceSettings, CONFIG_ENV};
pub use detect::{
    BackendRegistry, BoundingBox, Delegate, Detection, DetectionResult, DetectorBackend,
    DetectorEngine, DetectorError, DetectorEvent, DetectorSettings, EngineState, InitError,
    InitReport, StubBackend, NOTHING_LABEL,
};
pub use frame::{Frame, PixelFormat, RgbImage, Rotation};
pub use ingest::{open_source, FrameSource, PushSource, SyntheticConfig, SyntheticSource};
pub use pipeline::{DetectionPipeline, FrameSink, PipelineState, StatsSnapshot};
pub use presentation::{PresentationSnapshot, PresentationState};

mod orchestrator;
mod slot;

pub use orchestrator::{DetectionPipeline, PipelineState};
pub use slot::{FrameSink, StatsSnapshot};

//! Detection orchestrator.
//!
//! `DetectionPipeline` ties a frame source, a detector engine and the
//! presentation state together, bound to the host's visibility lifecycle:
//!
//! ```text
//!   Unbound --resume--> Active --pause--> Paused --resume--> Active ...
//! ```
//!
//! While Active, the source pushes frames into a keep-latest slot and one
//! dedicated worker thread runs detection sequentially, publishing each
//! outcome in completion order (which is arrival order). Pausing unbinds the
//! source without waiting for inference; an in-flight result is discarded.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};

use super::slot::{FrameSink, LatestFrameSlot, PipelineStats, StatsSnapshot};
use crate::detect::{DetectorEngine, DetectorEvent};
use crate::ingest::FrameSource;
use crate::presentation::PresentationState;

type EventListener = Arc<dyn Fn(&DetectorEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Unbound,
    Active,
    Paused,
}

pub struct DetectionPipeline {
    source: Box<dyn FrameSource>,
    engine: Arc<Mutex<DetectorEngine>>,
    presentation: Arc<PresentationState>,
    stats: Arc<PipelineStats>,
    listener: Option<EventListener>,
    state: PipelineState,
    slot: Option<Arc<LatestFrameSlot>>,
    workers: Vec<JoinHandle<()>>,
}

impl DetectionPipeline {
    pub fn new<S: FrameSource + 'static>(engine: DetectorEngine, source: S) -> Self {
        Self::from_boxed(engine, Box::new(source))
    }

    pub fn from_boxed(engine: DetectorEngine, source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            engine: Arc::new(Mutex::new(engine)),
            presentation: Arc::new(PresentationState::new()),
            stats: Arc::new(PipelineStats::default()),
            listener: None,
            state: PipelineState::Unbound,
            slot: None,
            workers: Vec::new(),
        }
    }

    /// Receive every published event (results, errors, delegate fallback) on
    /// the worker thread.
    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&DetectorEvent) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn presentation(&self) -> Arc<PresentationState> {
        self.presentation.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Host became visible: bind the source and start the worker.
    pub fn resume(&mut self) -> Result<()> {
        if self.state == PipelineState::Active {
            return Ok(());
        }
        self.workers.retain(|worker| !worker.is_finished());

        let slot = Arc::new(LatestFrameSlot::new());
        let worker = Worker {
            slot: slot.clone(),
            engine: self.engine.clone(),
            presentation: self.presentation.clone(),
            stats: self.stats.clone(),
            listener: self.listener.clone(),
            epoch: self.presentation.epoch(),
        };
        let handle = std::thread::Builder::new()
            .name("detection-worker".to_string())
            .spawn(move || worker.run())
            .context("failed to spawn detection worker")?;
        self.workers.push(handle);

        let sink = FrameSink::new(slot.clone(), self.stats.clone());
        if let Err(err) = self.source.bind(sink) {
            slot.close();
            return Err(err.context(format!("failed to bind frame source {}", self.source.name())));
        }

        self.slot = Some(slot);
        self.state = PipelineState::Active;
        log::info!("pipeline active: source {} bound", self.source.name());
        Ok(())
    }

    /// Host left the foreground: unbind the source and stop accepting frames.
    ///
    /// Does not wait for an in-flight detection; its outcome is discarded.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != PipelineState::Active {
            return Ok(());
        }
        self.state = PipelineState::Paused;
        let unbound = self.source.unbind();
        self.presentation.advance_epoch();
        if let Some(slot) = self.slot.take() {
            slot.close();
        }
        log::info!("pipeline paused: source {} unbound", self.source.name());
        unbound.with_context(|| format!("failed to unbind frame source {}", self.source.name()))
    }

    /// Pause and wait for every worker, including one still running inference.
    pub fn shutdown(mut self) -> Result<()> {
        self.pause()?;
        for worker in self.workers.drain(..) {
            worker
                .join()
                .map_err(|_| anyhow!("detection worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        if let Err(err) = self.pause() {
            log::warn!("pipeline drop: {:#}", err);
        }
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

struct Worker {
    slot: Arc<LatestFrameSlot>,
    engine: Arc<Mutex<DetectorEngine>>,
    presentation: Arc<PresentationState>,
    stats: Arc<PipelineStats>,
    listener: Option<EventListener>,
    epoch: u64,
}

impl Worker {
    fn run(self) {
        log::debug!("detection worker started (epoch {})", self.epoch);
        while let Some(frame) = self.slot.take() {
            let sequence = frame.sequence();
            log::debug!("frame {} waited {:?}", sequence, frame.age());
            let (outcome, fallback) = {
                let mut engine = self.lock_engine();
                let outcome = engine.detect(frame);
                (outcome, engine.take_fallback())
            };

            if let Some(report) = fallback {
                if let Some(reason) = report.fallback_reason {
                    self.deliver(&DetectorEvent::Fallback {
                        requested: report.requested,
                        used: report.delegate,
                        reason,
                    });
                }
            }

            let event = match outcome {
                Ok(result) => {
                    self.stats.record_processed();
                    DetectorEvent::Results(result)
                }
                Err(err) => {
                    self.stats.record_failed();
                    if err.is_transient() {
                        log::warn!("dropping frame {}: {}", sequence, err);
                    } else {
                        log::error!("frame {} skipped: {}", sequence, err);
                    }
                    DetectorEvent::Error(err)
                }
            };

            if !self.deliver(&event) {
                self.stats.record_discarded();
                log::debug!("discarding outcome for frame {} after pause", sequence);
            }
        }
        log::debug!("detection worker stopped (epoch {})", self.epoch);
    }

    /// Publish under this worker's epoch and notify the listener if it is current.
    fn deliver(&self, event: &DetectorEvent) -> bool {
        if !self.presentation.publish(self.epoch, event) {
            return false;
        }
        if let Some(listener) = &self.listener {
            listener(event);
        }
        true
    }

    // A worker from an earlier activation may still hold the engine; waiting
    // here keeps detect() strictly sequential. A panic inside the backend
    // leaves its model state unknown, so a poisoned engine is re-initialized.
    fn lock_engine(&self) -> MutexGuard<'_, DetectorEngine> {
        match self.engine.lock() {
            Ok(engine) => engine,
            Err(poisoned) => {
                log::error!("detector panicked during a previous frame; reloading model");
                let mut engine = poisoned.into_inner();
                engine.reset();
                self.engine.clear_poison();
                engine
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Delegate, Detection, DetectorSettings, EngineState, StubBackend};
    use crate::frame::{Frame, PixelFormat, Rotation};
    use crate::ingest::PushSource;
    use std::time::Duration;

    fn frame() -> Frame {
        Frame::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb24, Rotation::Deg0).unwrap()
    }

    fn pipeline(backend: StubBackend) -> (DetectionPipeline, PushSource) {
        let source = PushSource::new("test");
        let engine = DetectorEngine::new(DetectorSettings::default(), backend);
        (DetectionPipeline::new(engine, source.clone()), source)
    }

    #[test]
    fn lifecycle_transitions() {
        let (mut pipeline, source) = pipeline(StubBackend::scripted(Vec::new()));
        assert_eq!(pipeline.state(), PipelineState::Unbound);
        assert!(!source.is_bound());

        pipeline.pause().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Unbound);

        pipeline.resume().unwrap();
        pipeline.resume().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Active);
        assert!(source.is_bound());

        pipeline.pause().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Paused);
        assert!(!source.is_bound());

        pipeline.resume().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Active);
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn frame_result_reaches_presentation() {
        let (mut pipeline, source) =
            pipeline(StubBackend::scripted(vec![Detection::new("person", 0.9)]));
        let presentation = pipeline.presentation();
        pipeline.resume().unwrap();

        assert!(source.submit(frame()));
        let snapshot = presentation
            .wait_for_change(0, Duration::from_secs(5))
            .expect("published");
        assert_eq!(snapshot.label, "person");
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn poisoned_engine_is_reloaded() {
        let (mut pipeline, source) =
            pipeline(StubBackend::scripted(vec![Detection::new("dog", 0.8)]));
        let presentation = pipeline.presentation();
        pipeline.engine.lock().unwrap().initialize().unwrap();

        let engine = pipeline.engine.clone();
        let _ = std::thread::spawn(move || {
            let _guard = engine.lock().unwrap();
            panic!("backend crashed");
        })
        .join();
        assert!(pipeline.engine.is_poisoned());

        pipeline.resume().unwrap();
        assert!(source.submit(frame()));
        let snapshot = presentation
            .wait_for_change(0, Duration::from_secs(5))
            .expect("published");
        assert_eq!(snapshot.label, "dog");
        assert!(!pipeline.engine.is_poisoned());
        assert_eq!(
            pipeline.engine.lock().unwrap().state(),
            &EngineState::Ready(Delegate::Cpu)
        );
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn frames_are_rejected_while_paused() {
        let (mut pipeline, source) = pipeline(StubBackend::scripted(Vec::new()));
        assert!(!source.submit(frame()));
        pipeline.resume().unwrap();
        pipeline.pause().unwrap();
        assert!(!source.submit(frame()));
        assert_eq!(pipeline.stats().frames_processed, 0);
        pipeline.shutdown().unwrap();
    }
}

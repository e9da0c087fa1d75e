use std::time::Instant;

use crate::detect::backend::DetectorBackend;
use crate::detect::error::{DetectorError, InitError};
use crate::detect::result::{Detection, DetectionResult};
use crate::detect::settings::{Delegate, DetectorSettings};
use crate::frame::Frame;
use crate::ingest::normalize::upright_image;

/// Lifecycle of the loaded model.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    Uninitialized,
    Ready(Delegate),
    /// Last initialization failed. The next `detect` retries.
    Failed(InitError),
}

/// Outcome of a successful initialization.
#[derive(Clone, Debug, PartialEq)]
pub struct InitReport {
    pub requested: Delegate,
    pub delegate: Delegate,
    /// Set when the requested delegate could not be used and CPU was loaded instead.
    pub fallback_reason: Option<InitError>,
}

/// Detector engine adapter.
///
/// Wraps a `DetectorBackend` with the model lifecycle (load, CPU fallback,
/// lazy re-initialization) and the per-frame contract: rotate upright, run
/// inference, filter by threshold, cap by result count.
pub struct DetectorEngine {
    settings: DetectorSettings,
    backend: Box<dyn DetectorBackend>,
    state: EngineState,
    unreported_fallback: Option<InitReport>,
}

impl DetectorEngine {
    pub fn new<B: DetectorBackend + 'static>(settings: DetectorSettings, backend: B) -> Self {
        Self::from_boxed(settings, Box::new(backend))
    }

    pub fn from_boxed(settings: DetectorSettings, backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            settings,
            backend,
            state: EngineState::Uninitialized,
            unreported_fallback: None,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The last initialization that fell back to CPU, once per initialization.
    pub fn take_fallback(&mut self) -> Option<InitReport> {
        self.unreported_fallback.take()
    }

    /// Forget the loaded model; the next `detect` initializes again.
    pub fn reset(&mut self) {
        self.state = EngineState::Uninitialized;
    }

    /// Load the model on the requested delegate, falling back to CPU when the
    /// delegate is unsupported or fails to load.
    pub fn initialize(&mut self) -> Result<InitReport, InitError> {
        let requested = self.settings.delegate();
        let cpu_available = self.backend.supports_delegate(Delegate::Cpu);
        let mut fallback_reason = None;
        let mut delegate = requested;

        if !self.backend.supports_delegate(requested) {
            let err = InitError::DelegateUnsupported(requested);
            if requested == Delegate::Cpu || !cpu_available {
                return Err(self.fail(err));
            }
            log::warn!("{}; falling back to cpu", err);
            fallback_reason = Some(err);
            delegate = Delegate::Cpu;
        }

        if let Err(err) = self.backend.load(&self.settings.on_delegate(delegate)) {
            if delegate == Delegate::Cpu || !cpu_available {
                return Err(self.fail(err));
            }
            log::warn!(
                "{} load failed on {}: {}; retrying on cpu",
                self.backend.name(),
                delegate,
                err
            );
            fallback_reason = Some(err);
            delegate = Delegate::Cpu;
            if let Err(err) = self.backend.load(&self.settings.on_delegate(delegate)) {
                return Err(self.fail(err));
            }
        }

        log::info!(
            "{} detector ready (delegate={}, threshold={:.2}, max_results={})",
            self.backend.name(),
            delegate,
            self.settings.confidence_threshold(),
            self.settings.max_results()
        );
        self.state = EngineState::Ready(delegate);
        let report = InitReport {
            requested,
            delegate,
            fallback_reason,
        };
        if report.fallback_reason.is_some() {
            self.unreported_fallback = Some(report.clone());
        }
        Ok(report)
    }

    /// Run detection on one frame. Blocking; call from a worker thread.
    ///
    /// Consumes the frame, so its release hook fires exactly once when this
    /// returns, on success and on every error path. Initializes the engine
    /// first if it is not ready.
    pub fn detect(&mut self, frame: Frame) -> Result<DetectionResult, DetectorError> {
        if !matches!(self.state, EngineState::Ready(_)) {
            self.initialize()?;
        }

        let frame_sequence = frame.sequence();
        let started = Instant::now();
        let image = upright_image(&frame).map_err(|e| DetectorError::Frame(format!("{:#}", e)))?;
        let candidates = self
            .backend
            .detect(&image)
            .map_err(|e| DetectorError::Inference(format!("{:#}", e)))?;
        let inference_time_ms = started.elapsed().as_millis() as u64;

        let detections = rank_detections(
            candidates,
            self.settings.confidence_threshold(),
            self.settings.max_results(),
        );
        log::debug!(
            "frame {}: {} detection(s) in {}ms",
            frame_sequence,
            detections.len(),
            inference_time_ms
        );

        Ok(DetectionResult {
            detections,
            inference_time_ms,
            image_height: image.height(),
            image_width: image.width(),
            frame_sequence,
        })
    }

    fn fail(&mut self, err: InitError) -> InitError {
        log::error!("{} detector failed to initialize: {}", self.backend.name(), err);
        self.state = EngineState::Failed(err.clone());
        err
    }
}

/// Keep candidates at or above `threshold`, highest confidence first, at most `max_results`.
fn rank_detections(
    mut candidates: Vec<Detection>,
    threshold: f32,
    max_results: usize,
) -> Vec<Detection> {
    candidates.retain(|d| d.confidence.is_finite() && d.confidence >= threshold);
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates.truncate(max_results);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use crate::frame::{PixelFormat, Rotation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn settings(delegate: Delegate) -> DetectorSettings {
        DetectorSettings::new(0.5, 2, 3, delegate).unwrap()
    }

    fn frame(width: u32, height: u32, rotation: Rotation) -> Frame {
        let len = (width * height * 3) as usize;
        Frame::new(vec![9u8; len], width, height, PixelFormat::Rgb24, rotation).unwrap()
    }

    #[test]
    fn threshold_and_cap_are_applied() {
        let ranked = rank_detections(
            vec![
                Detection::new("dog", 0.3),
                Detection::new("car", 0.6),
                Detection::new("person", 0.9),
                Detection::new("bicycle", 0.5),
                Detection::new("sign", 0.7),
                Detection::new("ghost", f32::NAN),
            ],
            0.5,
            3,
        );
        let labels: Vec<_> = ranked.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "sign", "car"]);
    }

    #[test]
    fn gpu_unsupported_falls_back_to_cpu() {
        let mut engine = DetectorEngine::new(settings(Delegate::Gpu), StubBackend::new());
        let report = engine.initialize().unwrap();
        assert_eq!(report.delegate, Delegate::Cpu);
        assert_eq!(
            report.fallback_reason,
            Some(InitError::DelegateUnsupported(Delegate::Gpu))
        );
        assert_eq!(engine.state(), &EngineState::Ready(Delegate::Cpu));
    }

    #[test]
    fn fallback_is_reported_once() {
        let mut engine = DetectorEngine::new(settings(Delegate::Gpu), StubBackend::new());
        assert!(engine.take_fallback().is_none());

        engine.detect(frame(2, 2, Rotation::Deg0)).unwrap();
        let report = engine.take_fallback().expect("fallback recorded");
        assert_eq!((report.requested, report.delegate), (Delegate::Gpu, Delegate::Cpu));
        assert!(engine.take_fallback().is_none());

        engine.detect(frame(2, 2, Rotation::Deg0)).unwrap();
        assert!(engine.take_fallback().is_none());
    }

    #[test]
    fn failed_init_recovers_on_a_later_frame() {
        let backend =
            StubBackend::scripted(vec![Detection::new("person", 0.9)]).with_load_failures(1);
        let mut engine = DetectorEngine::new(settings(Delegate::Cpu), backend);

        let err = engine.detect(frame(2, 2, Rotation::Deg0)).unwrap_err();
        assert!(matches!(err, DetectorError::Init(InitError::Backend(_))));
        assert!(matches!(engine.state(), EngineState::Failed(_)));

        let result = engine.detect(frame(2, 2, Rotation::Deg0)).unwrap();
        assert_eq!(result.label(), "person");
        assert_eq!(engine.state(), &EngineState::Ready(Delegate::Cpu));
    }

    #[test]
    fn reset_forces_reinitialization() {
        let mut engine = DetectorEngine::new(settings(Delegate::Cpu), StubBackend::new());
        engine.initialize().unwrap();
        engine.reset();
        assert_eq!(engine.state(), &EngineState::Uninitialized);
        engine.detect(frame(2, 2, Rotation::Deg0)).unwrap();
        assert_eq!(engine.state(), &EngineState::Ready(Delegate::Cpu));
    }

    #[test]
    fn supported_gpu_is_used() {
        let backend = StubBackend::new().with_delegates(&[Delegate::Cpu, Delegate::Gpu]);
        let mut engine = DetectorEngine::new(settings(Delegate::Gpu), backend);
        let report = engine.initialize().unwrap();
        assert_eq!(report.delegate, Delegate::Gpu);
        assert_eq!(report.fallback_reason, None);
    }

    #[test]
    fn delegate_load_failure_retries_on_cpu() {
        let backend = StubBackend::new()
            .with_delegates(&[Delegate::Cpu, Delegate::Nnapi])
            .with_load_failure(Delegate::Nnapi);
        let mut engine = DetectorEngine::new(settings(Delegate::Nnapi), backend);
        let report = engine.initialize().unwrap();
        assert_eq!(report.delegate, Delegate::Cpu);
        assert!(matches!(report.fallback_reason, Some(InitError::Backend(_))));
    }

    #[test]
    fn no_fallback_without_cpu_is_terminal() {
        let backend = StubBackend::new().with_delegates(&[]);
        let mut engine = DetectorEngine::new(settings(Delegate::Gpu), backend);
        let err = engine.initialize().unwrap_err();
        assert_eq!(err, InitError::DelegateUnsupported(Delegate::Gpu));
        assert_eq!(engine.state(), &EngineState::Failed(err));
    }

    #[test]
    fn detect_initializes_lazily() {
        let backend = StubBackend::scripted(vec![Detection::new("person", 0.9)]);
        let mut engine = DetectorEngine::new(settings(Delegate::Cpu), backend);
        assert_eq!(engine.state(), &EngineState::Uninitialized);

        let result = engine.detect(frame(4, 2, Rotation::Deg0)).unwrap();
        assert_eq!(engine.state(), &EngineState::Ready(Delegate::Cpu));
        assert_eq!(result.label(), "person");
    }

    #[test]
    fn failed_init_surfaces_as_detector_error_and_releases_frame() {
        let backend = StubBackend::new().with_load_failure(Delegate::Cpu);
        let mut engine = DetectorEngine::new(settings(Delegate::Cpu), backend);

        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let frame = frame(2, 2, Rotation::Deg0).with_release_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let err = engine.detect(frame).unwrap_err();
        assert!(matches!(err, DetectorError::Init(InitError::Backend(_))));
        assert!(!err.is_transient());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn result_reports_upright_dimensions() {
        let backend = StubBackend::scripted(Vec::new());
        let mut engine = DetectorEngine::new(settings(Delegate::Cpu), backend);
        let result = engine
            .detect(frame(8, 4, Rotation::Deg90).with_sequence(3))
            .unwrap();
        assert_eq!((result.image_width, result.image_height), (4, 8));
        assert_eq!(result.frame_sequence, 3);
        assert!(result.is_empty());
    }

    #[test]
    fn inference_failure_is_transient() {
        let backend =
            StubBackend::scripted(vec![Detection::new("car", 0.8)]).with_inference_failures(1);
        let mut engine = DetectorEngine::new(settings(Delegate::Cpu), backend);

        let err = engine.detect(frame(2, 2, Rotation::Deg0)).unwrap_err();
        assert!(err.is_transient());
        let result = engine.detect(frame(2, 2, Rotation::Deg0)).unwrap();
        assert_eq!(result.label(), "car");
    }

    #[test]
    fn malformed_nv12_frame_is_rejected_per_frame() {
        let backend = StubBackend::scripted(Vec::new());
        let mut engine = DetectorEngine::new(settings(Delegate::Cpu), backend);
        // 3x2 NV12 has a valid length but odd width.
        let frame = Frame::new(vec![0u8; 9], 3, 2, PixelFormat::Nv12, Rotation::Deg0).unwrap();
        assert!(matches!(engine.detect(frame), Err(DetectorError::Frame(_))));
        assert_eq!(engine.state(), &EngineState::Ready(Delegate::Cpu));
    }
}

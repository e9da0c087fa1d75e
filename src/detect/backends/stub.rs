use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::sync::mpsc::{Receiver, Sender};

use crate::detect::backend::DetectorBackend;
use crate::detect::error::InitError;
use crate::detect::result::{BoundingBox, Detection};
use crate::detect::settings::{Delegate, DetectorSettings};
use crate::frame::RgbImage;

const STREET_LABELS: &[&str] = &[
    "person",
    "bicycle",
    "car",
    "dog",
    "traffic light",
    "stop sign",
];

/// Stub backend for testing and synthetic runs.
///
/// Without a script, candidates are derived from a pixel hash, so identical
/// images always yield identical detections.
pub struct StubBackend {
    script: Option<Vec<Detection>>,
    delegates: Vec<Delegate>,
    failing_loads: Vec<Delegate>,
    load_failures: usize,
    inference_failures: usize,
    loaded: Option<Delegate>,
    gate: Option<Receiver<()>>,
    started: Option<Sender<()>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: None,
            delegates: vec![Delegate::Cpu],
            failing_loads: Vec::new(),
            load_failures: 0,
            inference_failures: 0,
            loaded: None,
            gate: None,
            started: None,
        }
    }

    /// Return the same candidates for every image.
    pub fn scripted(detections: Vec<Detection>) -> Self {
        Self {
            script: Some(detections),
            ..Self::new()
        }
    }

    /// Delegates this "device" supports. Defaults to CPU only.
    pub fn with_delegates(mut self, delegates: &[Delegate]) -> Self {
        self.delegates = delegates.to_vec();
        self
    }

    /// Make `load` fail for the given delegate even though it is supported.
    pub fn with_load_failure(mut self, delegate: Delegate) -> Self {
        self.failing_loads.push(delegate);
        self
    }

    /// Fail the next `count` load calls, whatever the delegate.
    pub fn with_load_failures(mut self, count: usize) -> Self {
        self.load_failures = count;
        self
    }

    /// Fail the next `count` inference calls.
    pub fn with_inference_failures(mut self, count: usize) -> Self {
        self.inference_failures = count;
        self
    }

    /// Block each inference until a token arrives on `gate`.
    pub fn with_gate(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Signal `started` as each inference begins.
    pub fn with_start_signal(mut self, started: Sender<()>) -> Self {
        self.started = Some(started);
        self
    }

    pub fn loaded_delegate(&self) -> Option<Delegate> {
        self.loaded
    }

    fn hashed_candidates(image: &RgbImage) -> Vec<Detection> {
        let digest: [u8; 32] = Sha256::digest(image.pixels()).into();
        let count = (digest[0] % 4) as usize;
        let width = image.width() as f32;
        let height = image.height() as f32;
        (0..count)
            .map(|i| {
                let label = STREET_LABELS[digest[1 + 2 * i] as usize % STREET_LABELS.len()];
                let confidence = digest[2 + 2 * i] as f32 / 255.0;
                let left = digest[10 + i] as f32 / 512.0 * width;
                let top = digest[16 + i] as f32 / 512.0 * height;
                Detection::new(label, confidence).with_box(BoundingBox {
                    left,
                    top,
                    right: left + width / 2.0,
                    bottom: top + height / 2.0,
                })
            })
            .collect()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports_delegate(&self, delegate: Delegate) -> bool {
        self.delegates.contains(&delegate)
    }

    fn load(&mut self, settings: &DetectorSettings) -> Result<(), InitError> {
        let delegate = settings.delegate();
        if !self.supports_delegate(delegate) {
            return Err(InitError::DelegateUnsupported(delegate));
        }
        if self.load_failures > 0 {
            self.load_failures -= 1;
            return Err(InitError::Backend("stub load failure".to_string()));
        }
        if self.failing_loads.contains(&delegate) {
            return Err(InitError::Backend(format!(
                "stub load failure on {} delegate",
                delegate
            )));
        }
        self.loaded = Some(delegate);
        Ok(())
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        if self.loaded.is_none() {
            return Err(anyhow!("stub backend used before load"));
        }
        if let Some(started) = &self.started {
            let _ = started.send(());
        }
        if let Some(gate) = &self.gate {
            gate.recv()
                .map_err(|_| anyhow!("stub gate closed before inference released"))?;
        }
        if self.inference_failures > 0 {
            self.inference_failures -= 1;
            return Err(anyhow!("stub inference failure"));
        }
        Ok(match &self.script {
            Some(script) => script.clone(),
            None => Self::hashed_candidates(image),
        })
    }
}

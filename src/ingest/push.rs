//! Callback-driven frame source.
//!
//! `PushSource` is the seam for an embedding camera library: its analyzer
//! callback calls `submit` with each captured frame. Clones share the same
//! binding, so the camera callback can hold one handle while the pipeline
//! owns another.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use super::FrameSource;
use crate::frame::Frame;
use crate::pipeline::FrameSink;

#[derive(Clone)]
pub struct PushSource {
    name: String,
    sink: Arc<Mutex<Option<FrameSink>>>,
}

impl PushSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    /// Deliver a captured frame. Returns false when no pipeline is bound;
    /// the frame is released immediately in that case.
    pub fn submit(&self, frame: Frame) -> bool {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => sink.push(frame),
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }
}

impl FrameSource for PushSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, sink: FrameSink) -> Result<()> {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        log::debug!("{}: bound", self.name);
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        log::debug!("{}: unbound", self.name);
        Ok(())
    }
}

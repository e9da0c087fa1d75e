use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::frame::Frame;
use crate::pipeline::FrameSink;

/// Background capture loop shared by the pull-style sources.
///
/// Calls `produce` at the target rate and pushes each frame into the sink
/// until stopped, the producer is exhausted, or the sink closes.
pub(crate) struct CaptureThread {
    name: String,
    stop: Arc<AtomicBool>,
    captured: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl CaptureThread {
    pub(crate) fn spawn<P>(
        name: &str,
        target_fps: u32,
        sink: FrameSink,
        mut produce: P,
    ) -> Result<Self>
    where
        P: FnMut() -> Result<Option<Frame>> + Send + 'static,
    {
        if target_fps == 0 {
            return Err(anyhow!("target fps must be >= 1"));
        }
        let interval = Duration::from_secs(1) / target_fps;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let captured = Arc::new(AtomicU64::new(0));
        let captured_thread = captured.clone();
        let source_name = name.to_string();
        let join = std::thread::Builder::new()
            .name(format!("capture:{}", name))
            .spawn(move || {
                while !stop_thread.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    match produce() {
                        Ok(Some(frame)) => {
                            captured_thread.fetch_add(1, Ordering::SeqCst);
                            if !sink.push(frame) {
                                break;
                            }
                        }
                        Ok(None) => {
                            log::info!("{}: no more frames", source_name);
                            break;
                        }
                        Err(err) => log::warn!("{}: capture failed: {:#}", source_name, err),
                    }
                    if let Some(rest) = interval.checked_sub(started.elapsed()) {
                        std::thread::sleep(rest);
                    }
                }
            })
            .context("failed to spawn capture thread")?;
        Ok(Self {
            name: name.to_string(),
            stop,
            captured,
            join: Some(join),
        })
    }

    pub(crate) fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        log::debug!(
            "{}: capture stopped after {} frame(s)",
            self.name,
            self.captured.load(Ordering::SeqCst)
        );
        Ok(())
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

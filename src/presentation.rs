//! Presentation state: the single observable value the UI layer renders.
//!
//! Writers are pipeline workers; readers are whatever draws the label. Each
//! pipeline activation publishes under an epoch, and pausing advances the
//! epoch, so a detection that completes after a pause never reaches the UI.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::detect::{DetectionResult, DetectorError, DetectorEvent, NOTHING_LABEL};

#[derive(Clone, Debug, PartialEq)]
pub struct PresentationSnapshot {
    /// Latest human-readable label, `"Nothing"` when there is nothing to show.
    pub label: String,
    pub last_result: Option<DetectionResult>,
    pub last_error: Option<DetectorError>,
    /// Incremented on every change.
    pub version: u64,
}

struct Inner {
    snapshot: PresentationSnapshot,
    epoch: u64,
}

pub struct PresentationState {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl PresentationState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: PresentationSnapshot {
                    label: NOTHING_LABEL.to_string(),
                    last_result: None,
                    last_error: None,
                    version: 0,
                },
                epoch: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn label(&self) -> String {
        self.lock().snapshot.label.clone()
    }

    pub fn snapshot(&self) -> PresentationSnapshot {
        self.lock().snapshot.clone()
    }

    /// Block until the version moves past `since_version` or `timeout` elapses.
    pub fn wait_for_change(
        &self,
        since_version: u64,
        timeout: Duration,
    ) -> Option<PresentationSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        while inner.snapshot.version <= since_version {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            inner = self
                .changed
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Some(inner.snapshot.clone())
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Publish a detection outcome. Ignored unless `epoch` is still current.
    ///
    /// Fallback notices pass the epoch check but leave the snapshot alone.
    pub(crate) fn publish(&self, epoch: u64, event: &DetectorEvent) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        let snapshot = &mut inner.snapshot;
        match event {
            DetectorEvent::Results(result) => {
                snapshot.last_result = Some(result.clone());
                snapshot.last_error = None;
            }
            DetectorEvent::Error(err) => {
                snapshot.last_result = None;
                snapshot.last_error = Some(err.clone());
            }
            DetectorEvent::Fallback { .. } => return true,
        }
        snapshot.label = event.label().to_string();
        snapshot.version += 1;
        drop(inner);
        self.changed.notify_all();
        true
    }

    /// Invalidate outstanding publishers and reset the label.
    pub(crate) fn advance_epoch(&self) -> u64 {
        let mut inner = self.lock();
        inner.epoch += 1;
        let epoch = inner.epoch;
        let snapshot = &mut inner.snapshot;
        snapshot.label = NOTHING_LABEL.to_string();
        snapshot.last_result = None;
        snapshot.last_error = None;
        snapshot.version += 1;
        drop(inner);
        self.changed.notify_all();
        epoch
    }

    // A reader must always get a value; a panicking writer leaves a whole snapshot behind.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PresentationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Delegate, Detection, InitError};

    fn results(labels: &[(&str, f32)]) -> DetectorEvent {
        DetectorEvent::Results(DetectionResult {
            detections: labels
                .iter()
                .map(|(label, confidence)| Detection::new(*label, *confidence))
                .collect(),
            ..DetectionResult::default()
        })
    }

    #[test]
    fn starts_with_nothing() {
        let state = PresentationState::new();
        assert_eq!(state.label(), NOTHING_LABEL);
        assert_eq!(state.snapshot().version, 0);
    }

    #[test]
    fn latest_publish_wins() {
        let state = PresentationState::new();
        let epoch = state.epoch();
        assert!(state.publish(epoch, &results(&[("person", 0.9)])));
        assert!(state.publish(epoch, &results(&[("car", 0.8)])));
        assert_eq!(state.label(), "car");
        assert_eq!(state.snapshot().version, 2);
    }

    #[test]
    fn empty_results_and_errors_show_nothing() {
        let state = PresentationState::new();
        let epoch = state.epoch();
        state.publish(epoch, &results(&[("person", 0.9)]));
        state.publish(epoch, &results(&[]));
        assert_eq!(state.label(), NOTHING_LABEL);

        state.publish(epoch, &results(&[("person", 0.9)]));
        state.publish(
            epoch,
            &DetectorEvent::Error(DetectorError::Init(InitError::Backend("boom".into()))),
        );
        let snapshot = state.snapshot();
        assert_eq!(snapshot.label, NOTHING_LABEL);
        assert!(snapshot.last_result.is_none());
        assert!(snapshot.last_error.is_some());
    }

    #[test]
    fn fallback_leaves_snapshot_untouched() {
        let state = PresentationState::new();
        let epoch = state.epoch();
        state.publish(epoch, &results(&[("person", 0.9)]));
        let before = state.snapshot();

        let fallback = DetectorEvent::Fallback {
            requested: Delegate::Nnapi,
            used: Delegate::Cpu,
            reason: InitError::DelegateUnsupported(Delegate::Nnapi),
        };
        assert!(state.publish(epoch, &fallback));
        assert_eq!(state.snapshot(), before);

        state.advance_epoch();
        assert!(!state.publish(epoch, &fallback));
    }

    #[test]
    fn stale_epoch_is_ignored() {
        let state = PresentationState::new();
        let old = state.epoch();
        state.publish(old, &results(&[("dog", 0.7)]));
        state.advance_epoch();
        assert_eq!(state.label(), NOTHING_LABEL);
        assert!(!state.publish(old, &results(&[("person", 0.9)])));
        assert_eq!(state.label(), NOTHING_LABEL);
    }

    #[test]
    fn wait_for_change_times_out_without_publish() {
        let state = PresentationState::new();
        assert!(state
            .wait_for_change(0, Duration::from_millis(10))
            .is_none());
        state.publish(state.epoch(), &results(&[("person", 0.9)]));
        let snapshot = state.wait_for_change(0, Duration::from_millis(10)).unwrap();
        assert_eq!(snapshot.label, "person");
    }
}

use std::time::{Duration, Instant};

use gstreamer as gst;
use gstreamer::prelude::*;
use parking_lot::{Condvar, Mutex};

use crate::error::StateError;

/// The four states a pipeline is driven through, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphState {
    Stopped,
    Ready,
    Paused,
    Playing,
}

impl GraphState {
    pub const ALL: [GraphState; 4] = [
        GraphState::Stopped,
        GraphState::Ready,
        GraphState::Paused,
        GraphState::Playing,
    ];

    pub fn from_gst(state: gst::State) -> Option<Self> {
        match state {
            gst::State::Null => Some(GraphState::Stopped),
            gst::State::Ready => Some(GraphState::Ready),
            gst::State::Paused => Some(GraphState::Paused),
            gst::State::Playing => Some(GraphState::Playing),
            _ => None,
        }
    }
}

impl From<GraphState> for gst::State {
    fn from(state: GraphState) -> Self {
        match state {
            GraphState::Stopped => gst::State::Null,
            GraphState::Ready => gst::State::Ready,
            GraphState::Paused => gst::State::Paused,
            GraphState::Playing => gst::State::Playing,
        }
    }
}

/// Wakes state waiters when the bus reports a state change or an error.
#[derive(Debug, Default)]
pub(crate) struct StateSignal {
    inner: Mutex<Observed>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct Observed {
    serial: u64,
    failure: Option<String>,
}

impl StateSignal {
    pub(crate) fn notify_changed(&self) {
        let mut observed = self.inner.lock();
        observed.serial = observed.serial.wrapping_add(1);
        self.changed.notify_all();
    }

    pub(crate) fn notify_failure(&self, message: String) {
        let mut observed = self.inner.lock();
        observed.serial = observed.serial.wrapping_add(1);
        observed.failure = Some(message);
        self.changed.notify_all();
    }

    fn begin(&self) -> u64 {
        let mut observed = self.inner.lock();
        observed.failure = None;
        observed.serial
    }
}

/// Requests `target` and blocks until the pipeline reports it or `timeout`
/// elapses. Requesting the current state succeeds immediately.
pub(crate) fn request_state(
    pipeline: &gst::Pipeline,
    signal: &StateSignal,
    target: GraphState,
    timeout: Duration,
) -> Result<(), StateError> {
    let mut seen = signal.begin();
    let deadline = Instant::now() + timeout;

    let ret = pipeline
        .set_state(target.into())
        .map_err(|e| StateError::Rejected(e.to_string()))?;
    tracing::debug!(?target, ?ret, "state change requested");

    loop {
        if GraphState::from_gst(pipeline.current_state()) == Some(target) {
            return Ok(());
        }

        let mut observed = signal.inner.lock();
        if let Some(failure) = observed.failure.take() {
            return Err(StateError::Rejected(failure));
        }
        if observed.serial != seen {
            seen = observed.serial;
            continue;
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(StateError::Timeout {
                target,
                waited: timeout,
            });
        }
        signal.changed.wait_for(&mut observed, deadline - now);
    }
}

/// Asks every direct child of the pipeline to adopt the pipeline's state,
/// on a background thread. Failures are logged only.
pub(crate) fn resync_children(pipeline: &gst::Pipeline) {
    let pipeline = pipeline.clone();
    let spawned = std::thread::Builder::new()
        .name("streamer-resync".into())
        .spawn(move || {
            for element in pipeline.children() {
                if let Err(e) = element.sync_state_with_parent() {
                    tracing::warn!(
                        element = %element.name(),
                        error = %e,
                        "failed to sync state with parent"
                    );
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to spawn resync thread");
    }
}

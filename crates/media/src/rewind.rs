//! Rewind after end of stream.
//!
//! GStreamer pipelines in this setup are not safely restartable right after
//! EOS: they are paused, then after a short delay seeked back to zero, then
//! after another delay the first frame is pulled into the slot again. Keep the
//! whole sequence here so it can be dropped once the pipeline restarts cleanly
//! on its own.

use std::sync::Weak;
use std::time::Duration;

use crate::controller::Shared;
use crate::graph::Graph;
use crate::state::GraphState;

pub(crate) fn spawn(shared: Weak<Shared>, generation: u64, delay: Duration) {
    let spawned = std::thread::Builder::new()
        .name("streamer-eos-rewind".into())
        .spawn(move || rewind(&shared, generation, delay));
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to spawn the rewind thread");
    }
}

fn rewind(shared: &Weak<Shared>, generation: u64, delay: Duration) {
    let paused = with_graph(shared, generation, |shared, graph| {
        if let Err(e) = shared.request_state_on(graph, GraphState::Paused) {
            tracing::warn!(error = %e, "failed to pause after end of stream");
        }
    });
    if !paused {
        return;
    }

    std::thread::sleep(delay);
    let seeked = with_graph(shared, generation, |shared, graph| {
        if let Err(e) = shared.seek_on(graph, Duration::ZERO) {
            tracing::warn!(error = %e, "failed to rewind after end of stream");
        }
    });
    if !seeked {
        return;
    }

    std::thread::sleep(delay);
    with_graph(shared, generation, |shared, graph| {
        if !shared.refresh_frame_on(graph) {
            tracing::warn!("failed to get the first frame after rewind");
        }
    });
}

/// Runs `f` against the live graph if it is still `generation`, holding the
/// graph operation lock so the graph cannot be torn down meanwhile.
fn with_graph<F>(shared: &Weak<Shared>, generation: u64, f: F) -> bool
where
    F: FnOnce(&Shared, &Graph),
{
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    let _ops = shared.ops.lock();
    let Some(graph) = shared.graph_for(generation) else {
        tracing::debug!(generation, "pipeline replaced, rewind abandoned");
        return false;
    };
    f(&shared, &graph);
    true
}

use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::controller::{PipelineController, Shared};
use crate::error::{Result, SeekError};
use crate::graph::Graph;
use crate::state;

impl Shared {
    /// Flushing seek to `position`, then forces the appsink and every other
    /// element back in sync with the pipeline state.
    pub(crate) fn seek_on(&self, graph: &Graph, position: Duration) -> Result<()> {
        let mut query = gst::query::Seeking::new(gst::Format::Time);
        if !graph.pipeline.query(&mut query) || !query.result().0 {
            return Err(SeekError::Unsupported.into());
        }

        let target = gst::ClockTime::from_nseconds(
            u64::try_from(position.as_nanos()).unwrap_or(u64::MAX),
        );
        let seeked = graph.pipeline.seek_simple(gst::SeekFlags::FLUSH, target);
        state::resync_children(&graph.pipeline);
        if let Err(e) = seeked {
            tracing::debug!(error = %e, ?position, "seek rejected");
            return Err(SeekError::Failed(position).into());
        }

        if let Err(e) = graph.output.sync_state_with_parent() {
            tracing::warn!(error = %e, "failed to sync the appsink after seek");
        }
        self.slot.reset_position(graph.generation, position);
        tracing::debug!(?position, "seeked");
        Ok(())
    }
}

impl PipelineController {
    /// Jumps to `position`. The pipeline must be at least paused and report
    /// itself seekable.
    pub fn seek(&self, position: Duration) -> Result<()> {
        let shared = self.shared();
        shared.with_live_graph(|graph| shared.seek_on(graph, position))
    }

    /// Seeks relative to the current position, clamping at zero.
    pub fn step(&self, offset: Duration, forward: bool) -> Result<()> {
        let position = self.current_position()?;
        let target = if forward {
            position.saturating_add(offset)
        } else {
            position.saturating_sub(offset)
        };
        self.seek(target)
    }

    /// Pulls the appsink's latest sample into the frame slot again. Useful
    /// after seeking a paused pipeline. Returns whether a frame was stored.
    pub fn refresh_frame(&self) -> Result<bool> {
        let shared = self.shared();
        let graph = shared.current_graph()?;
        Ok(shared.refresh_frame_on(&graph))
    }
}

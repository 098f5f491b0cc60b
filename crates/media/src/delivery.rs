//! Appsink callbacks. These run on GStreamer streaming threads, one at a time
//! per pipeline, concurrently with the consumer's calls into the controller.

use std::sync::Weak;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use crate::controller::Shared;
use crate::frame::{caps_dimensions, decode_sample};
use crate::graph::Graph;
use crate::rewind;

pub(crate) fn register(graph: &Graph, shared: Weak<Shared>) {
    let generation = graph.generation;
    let pipeline = graph.pipeline.downgrade();
    let on_preroll = shared.clone();
    let on_sample = shared.clone();
    let on_eos = shared;

    graph.output.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_preroll(move |sink| {
                if let Some(shared) = on_preroll.upgrade() {
                    shared.on_first_frame(generation, sink);
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .new_sample(move |sink| {
                if let Some(shared) = on_sample.upgrade() {
                    let position = || pipeline.upgrade()?.query_position::<gst::ClockTime>();
                    shared.on_new_frame(generation, sink, position);
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .eos(move |_sink| {
                if let Some(shared) = on_eos.upgrade() {
                    shared.on_end_of_stream(generation, on_eos.clone());
                }
            })
            .build(),
    );
}

impl Shared {
    fn on_first_frame(&self, generation: u64, sink: &gst_app::AppSink) {
        if !self.is_current(generation) {
            return;
        }

        let caps = sink.static_pad("sink").and_then(|pad| pad.current_caps());
        match caps.as_deref().and_then(caps_dimensions) {
            Some((width, height)) => {
                tracing::debug!(width, height, "negotiated frame size");
                self.slot.set_size(generation, width, height);
            }
            None => tracing::warn!(?caps, "failed to read the frame size"),
        }

        if let Some(sample) = sink.try_pull_preroll(gst::ClockTime::ZERO) {
            self.store_sample(generation, &sample);
        }

        let cb = self.callbacks.read().pre_roll.clone();
        self.dispatcher.call(cb);
    }

    /// A decode failure is counted and logged, the slot keeps its previous
    /// frame and the pipeline keeps streaming.
    fn on_new_frame<P>(&self, generation: u64, sink: &gst_app::AppSink, position: P)
    where
        P: FnOnce() -> Option<gst::ClockTime>,
    {
        if !self.is_current(generation) {
            return;
        }
        let Some(sample) = sink.try_pull_sample(gst::ClockTime::ZERO) else {
            return;
        };
        if !self.store_sample(generation, &sample) {
            return;
        }

        let reported = position().map(|p| Duration::from_nanos(p.nseconds()));
        if reported.is_none() {
            tracing::debug!("position unavailable, reporting the last known one");
        }
        let Some(position) = self.slot.frame_position(generation, reported) else {
            return;
        };
        if let Some(cb) = self.callbacks.read().new_frame.clone() {
            self.dispatcher.dispatch(move || cb(position));
        }
    }

    fn on_end_of_stream(&self, generation: u64, shared: Weak<Shared>) {
        if !self.is_current(generation) {
            return;
        }
        tracing::debug!(generation, "end of stream");
        let cb = self.callbacks.read().eos.clone();
        self.dispatcher.call(cb);
        rewind::spawn(shared, generation, self.config.eos_rewind_delay());
    }

    pub(crate) fn store_sample(&self, generation: u64, sample: &gst::Sample) -> bool {
        match decode_sample(sample) {
            Ok(image) => self.slot.publish(generation, image),
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode frame");
                self.slot.record_decode_failure(generation);
                false
            }
        }
    }

    /// Decodes the appsink's last sample into the slot again.
    pub(crate) fn refresh_frame_on(&self, graph: &Graph) -> bool {
        let sample = graph.output.property::<Option<gst::Sample>>("last-sample");
        match sample {
            Some(sample) => self.store_sample(graph.generation, &sample),
            None => {
                tracing::debug!("appsink has no last sample");
                false
            }
        }
    }
}

use std::sync::atomic::{AtomicU32, AtomicU8};
use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use parking_lot::{Mutex, RwLock};

use crate::config::ControllerConfig;
use crate::delivery;
use crate::dispatch::{Callbacks, Dispatcher};
use crate::engine;
use crate::error::{Result, StreamerError};
use crate::frame::{FrameSlot, VideoFrame};
use crate::graph::Graph;
use crate::state::{self, GraphState};
use crate::template::GraphTemplate;

/// State shared with the engine-thread callbacks, which only ever hold a
/// `Weak` to it.
pub(crate) struct Shared {
    pub(crate) config: ControllerConfig,
    /// Held across every state change, seek and teardown, so a graph is never
    /// driven while it is being replaced. Taken before `graph`.
    pub(crate) ops: Mutex<()>,
    pub(crate) graph: Mutex<Option<Graph>>,
    pub(crate) slot: Arc<FrameSlot>,
    pub(crate) callbacks: RwLock<Callbacks>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) rate: AtomicU32,
    pub(crate) quality: AtomicU8,
}

impl Shared {
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.slot.generation() == generation
    }

    pub(crate) fn current_graph(&self) -> Result<Graph> {
        self.graph.lock().clone().ok_or(StreamerError::NoGraph)
    }

    /// Runs `f` on the live graph with graph operations serialized.
    pub(crate) fn with_live_graph<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Graph) -> Result<T>,
    {
        let _ops = self.ops.lock();
        let graph = self.current_graph()?;
        f(&graph)
    }

    /// The live graph, if it is still the one registered as `generation`.
    pub(crate) fn graph_for(&self, generation: u64) -> Option<Graph> {
        self.graph
            .lock()
            .as_ref()
            .filter(|g| g.generation == generation)
            .cloned()
    }

    pub(crate) fn request_state_on(&self, graph: &Graph, target: GraphState) -> Result<()> {
        state::request_state(
            &graph.pipeline,
            &graph.signal,
            target,
            self.config.state_timeout(),
        )?;
        state::resync_children(&graph.pipeline);
        Ok(())
    }

    pub(crate) fn on_title(&self, generation: u64, title: String) {
        if !self.is_current(generation) {
            return;
        }
        if let Some(cb) = self.callbacks.read().title.clone() {
            self.dispatcher.dispatch(move || cb(title));
        }
    }
}

/// Drives one GStreamer pipeline that ends in an `appsink` and republishes the
/// frames it produces.
///
/// At most one pipeline is live at a time; loading another one stops and
/// releases the previous pipeline first. Frames land in a [`FrameSlot`] shared
/// with the consumer, and consumer callbacks run on a dedicated thread.
pub struct PipelineController {
    shared: Arc<Shared>,
}

impl PipelineController {
    pub fn new() -> Result<Self> {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        engine::ensure_started()?;
        Ok(Self {
            shared: Arc::new(Shared {
                rate: AtomicU32::new(config.frame_rate),
                quality: AtomicU8::new(config.image_quality),
                config,
                ops: Mutex::new(()),
                graph: Mutex::new(None),
                slot: Arc::new(FrameSlot::default()),
                callbacks: RwLock::new(Callbacks::default()),
                dispatcher: Dispatcher::spawn(),
            }),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Renders `template` with the configured role names and loads it.
    ///
    /// The template must contain an `appsink` named after the
    /// [`Role::AppOutput`](crate::Role::AppOutput) role:
    ///
    /// ```text
    /// videotestsrc name={{Input}} !        # the input
    /// videoconvert !
    /// videorate name={{RateLimiter}} !
    /// jpegenc name={{FrameEncoder}} !      # jpeg or png
    /// appsink name={{AppOutput}} sync=true
    /// ```
    pub fn set_pipeline_from_string(&self, template: &str) -> Result<()> {
        self.set_pipeline_from_template(&GraphTemplate::new(template))
    }

    pub fn set_pipeline_from_template(&self, template: &GraphTemplate) -> Result<()> {
        let description = template.render(&self.shared.config.roles)?;
        tracing::debug!(%description, "building pipeline");
        self.install(|| engine::parse_pipeline(&description), true)
    }

    /// Takes ownership of an already built pipeline.
    pub fn set_pipeline(&self, pipeline: gst::Pipeline) -> Result<()> {
        self.install(move || Ok(pipeline), false)
    }

    fn install<F>(&self, build: F, owned: bool) -> Result<()>
    where
        F: FnOnce() -> Result<gst::Pipeline>,
    {
        let _ops = self.shared.ops.lock();
        let mut current = self.shared.graph.lock();
        let old = current.take();
        let generation = self.shared.slot.reset();
        if let Some(old) = old {
            old.shutdown();
        }

        let pipeline = build()?;
        let graph = match Graph::assemble(pipeline.clone(), &self.shared.config.roles, generation, owned) {
            Ok(graph) => graph,
            Err(e) => {
                if let Err(stop) = pipeline.set_state(gst::State::Null) {
                    tracing::warn!(error = %stop, "failed to stop rejected pipeline");
                }
                return Err(e.into());
            }
        };
        delivery::register(&graph, Arc::downgrade(&self.shared));
        graph.watch_bus(Arc::downgrade(&self.shared));

        tracing::info!(generation, "pipeline loaded");
        *current = Some(graph);
        Ok(())
    }

    /// Stops and releases the live pipeline, if any.
    pub fn close(&self) {
        let _ops = self.shared.ops.lock();
        let old = self.shared.graph.lock().take();
        self.shared.slot.reset();
        if let Some(graph) = old {
            graph.shutdown();
        }
    }

    pub fn pipeline(&self) -> Option<gst::Pipeline> {
        self.shared.graph.lock().as_ref().map(|g| g.pipeline.clone())
    }

    /// Moves the pipeline to `target`, blocking until the state is reached or
    /// the configured timeout elapses.
    pub fn request_state(&self, target: GraphState) -> Result<()> {
        self.shared
            .with_live_graph(|graph| self.shared.request_state_on(graph, target))
    }

    /// The state the engine currently reports. Transitional states yield `None`.
    pub fn current_state(&self) -> Option<GraphState> {
        let graph = self.shared.graph.lock().clone()?;
        GraphState::from_gst(graph.pipeline.current_state())
    }

    pub fn is_playing(&self) -> bool {
        self.current_state() == Some(GraphState::Playing)
    }

    pub fn play(&self) -> Result<()> {
        self.request_state(GraphState::Playing)?;
        let cb = self.shared.callbacks.read().start_playing.clone();
        self.shared.dispatcher.call(cb);
        Ok(())
    }

    /// Pauses, then seeks to the current position so the pipeline resumes
    /// cleanly later.
    pub fn pause(&self) -> Result<()> {
        self.shared.with_live_graph(|graph| {
            self.shared.request_state_on(graph, GraphState::Paused)?;
            if let Some(position) = graph.position() {
                if let Err(e) = self.shared.seek_on(graph, position) {
                    tracing::debug!(error = %e, "re-seek after pause failed");
                }
            }
            Ok(())
        })?;
        let cb = self.shared.callbacks.read().paused.clone();
        self.shared.dispatcher.call(cb);
        Ok(())
    }

    pub fn current_position(&self) -> Result<Duration> {
        self.shared
            .current_graph()?
            .position()
            .ok_or(StreamerError::PositionUnavailable)
    }

    /// Position reported with the last delivered frame, or the last seek target.
    pub fn frame_position(&self) -> Duration {
        self.shared.slot.position()
    }

    pub fn duration(&self) -> Result<Duration> {
        self.shared
            .current_graph()?
            .duration()
            .ok_or(StreamerError::DurationUnavailable)
    }

    /// Negotiated frame size, `(0, 0)` until the first frame arrived.
    pub fn video_size(&self) -> (u32, u32) {
        self.shared.slot.size()
    }

    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        self.shared.slot.clone()
    }

    pub fn frame(&self) -> Option<VideoFrame> {
        self.shared.slot.latest()
    }

    pub fn set_on_pre_roll(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.write().pre_roll = Some(Arc::new(f));
    }

    pub fn set_on_new_frame(&self, f: impl Fn(Duration) + Send + Sync + 'static) {
        self.shared.callbacks.write().new_frame = Some(Arc::new(f));
    }

    pub fn set_on_eos(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.write().eos = Some(Arc::new(f));
    }

    pub fn set_on_paused(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.write().paused = Some(Arc::new(f));
    }

    pub fn set_on_start_playing(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.write().start_playing = Some(Arc::new(f));
    }

    pub fn set_on_title(&self, f: impl Fn(String) + Send + Sync + 'static) {
        self.shared.callbacks.write().title = Some(Arc::new(f));
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.close();
    }
}

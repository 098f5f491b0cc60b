use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use crate::controller::Shared;
use crate::error::BuildError;
use crate::roles::{Role, RoleNames};
use crate::state::StateSignal;

/// Optional elements found by role name. A missing element only disables the
/// operations that need it.
#[derive(Debug, Clone, Default)]
pub(crate) struct OptionalElements {
    input: Option<gst::Element>,
    decoder: Option<gst::Element>,
    rate_limiter: Option<gst::Element>,
    frame_encoder: Option<gst::Element>,
    volume: Option<gst::Element>,
    color_balance: Option<gst::Element>,
}

impl OptionalElements {
    fn locate(pipeline: &gst::Pipeline, roles: &RoleNames) -> Self {
        let find = |role: Role| {
            let name = roles.element_name(role);
            let element = pipeline.by_name(name);
            match (&element, role) {
                (Some(_), _) => {}
                (None, Role::VolumeControl | Role::ColorBalance) => {
                    tracing::debug!(%role, element = name, "optional element not found");
                }
                (None, _) => {
                    tracing::warn!(%role, element = name, "optional element not found");
                }
            }
            element
        };
        Self {
            input: find(Role::Input),
            decoder: find(Role::Decoder),
            rate_limiter: find(Role::RateLimiter),
            frame_encoder: find(Role::FrameEncoder),
            volume: find(Role::VolumeControl),
            color_balance: find(Role::ColorBalance),
        }
    }

    pub(crate) fn get(&self, role: Role) -> Option<&gst::Element> {
        match role {
            Role::Input => self.input.as_ref(),
            Role::Decoder => self.decoder.as_ref(),
            Role::RateLimiter => self.rate_limiter.as_ref(),
            Role::FrameEncoder => self.frame_encoder.as_ref(),
            Role::VolumeControl => self.volume.as_ref(),
            Role::ColorBalance => self.color_balance.as_ref(),
            Role::AppOutput => None,
        }
    }
}

/// The live pipeline and everything located in it. Clones share the same
/// underlying GStreamer objects.
#[derive(Debug, Clone)]
pub(crate) struct Graph {
    pub pipeline: gst::Pipeline,
    pub output: gst_app::AppSink,
    pub elements: OptionalElements,
    pub signal: Arc<StateSignal>,
    pub generation: u64,
    duration: Arc<OnceLock<Duration>>,
    owned: bool,
}

impl Graph {
    /// Locates the roles in `pipeline`. Fails if the appsink is missing.
    pub(crate) fn assemble(
        pipeline: gst::Pipeline,
        roles: &RoleNames,
        generation: u64,
        owned: bool,
    ) -> Result<Self, BuildError> {
        let output_name = roles.element_name(Role::AppOutput);
        let output = pipeline
            .by_name(output_name)
            .ok_or_else(|| BuildError::MissingMandatoryOutput(output_name.to_string()))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| BuildError::OutputNotAppSink(output_name.to_string()))?;

        Ok(Self {
            elements: OptionalElements::locate(&pipeline, roles),
            pipeline,
            output,
            signal: Arc::new(StateSignal::default()),
            generation,
            duration: Arc::new(OnceLock::new()),
            owned,
        })
    }

    /// Forwards state changes and errors to the state waiters and stream
    /// titles to the controller. Messages are consumed here and never queued.
    pub(crate) fn watch_bus(&self, shared: Weak<Shared>) {
        let Some(bus) = self.pipeline.bus() else {
            tracing::warn!("pipeline has no bus, state changes are not observable");
            return;
        };
        let signal = self.signal.clone();
        let generation = self.generation;
        bus.unset_sync_handler();
        bus.set_sync_handler(move |_bus, msg| {
            match msg.view() {
                gst::MessageView::StateChanged(_) | gst::MessageView::AsyncDone(_) => {
                    signal.notify_changed();
                }
                gst::MessageView::Error(err) => {
                    let source = msg.src().map(|s| s.path_string().to_string());
                    tracing::warn!(
                        source = source.as_deref().unwrap_or("?"),
                        error = %err.error(),
                        debug = ?err.debug(),
                        "pipeline error"
                    );
                    signal.notify_failure(err.error().to_string());
                }
                gst::MessageView::Tag(tag) => {
                    let title = tag
                        .tags()
                        .get::<gst::tags::Title>()
                        .map(|t| t.get().to_string());
                    if let (Some(title), Some(shared)) = (title, shared.upgrade()) {
                        shared.on_title(generation, title);
                    }
                }
                _ => {}
            }
            gst::BusSyncReply::Drop
        });
    }

    pub(crate) fn duration(&self) -> Option<Duration> {
        if let Some(d) = self.duration.get() {
            return Some(*d);
        }
        let d = self
            .pipeline
            .query_duration::<gst::ClockTime>()
            .map(|d| Duration::from_nanos(d.nseconds()))?;
        Some(*self.duration.get_or_init(|| d))
    }

    pub(crate) fn position(&self) -> Option<Duration> {
        self.pipeline
            .query_position::<gst::ClockTime>()
            .map(|p| Duration::from_nanos(p.nseconds()))
    }

    /// Stops the pipeline and releases its elements.
    pub(crate) fn shutdown(&self) {
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(error = %e, "failed to stop pipeline");
        }
        let (stopped, current, _) = self.pipeline.state(gst::ClockTime::from_seconds(2));
        if let Err(e) = stopped {
            tracing::warn!(error = %e, ?current, "pipeline did not stop in time");
        }
        if self.owned {
            for child in self.pipeline.children() {
                if let Err(e) = self.pipeline.remove(&child) {
                    tracing::warn!(element = %child.name(), error = %e, "failed to remove element");
                }
            }
        }
        tracing::debug!(generation = self.generation, "pipeline torn down");
    }
}

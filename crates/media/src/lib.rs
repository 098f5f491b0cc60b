pub mod config;
mod controller;
mod delivery;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frame;
mod graph;
pub mod location;
pub mod properties;
mod rewind;
pub mod roles;
mod seek;
pub mod state;
pub mod template;

pub use gstreamer as gst;

pub use config::{max_lateness_ns, ControllerConfig};
pub use controller::PipelineController;
pub use engine::{ensure_started, has_elements};
pub use error::{
    BuildError, PropertyError, RenderError, Result, SeekError, StateError, StreamerError,
};
pub use frame::{FrameError, FrameSlot, VideoFrame};
pub use location::location_template;
pub use properties::BalanceParameters;
pub use roles::{Role, RoleNames};
pub use state::GraphState;
pub use template::{render, GraphTemplate};

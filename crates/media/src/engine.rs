use std::sync::OnceLock;

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::error::{BuildError, Result, StreamerError};

static STARTED: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initializes GStreamer once per process. Later calls return the outcome of
/// the first one.
pub fn ensure_started() -> Result<()> {
    STARTED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            tracing::debug!(version = %gst::version_string(), "GStreamer initialized");
            Ok(())
        })
        .clone()
        .map_err(StreamerError::Init)
}

/// Parses a launch description. A description made of a single element is
/// wrapped into a fresh pipeline.
pub fn parse_pipeline(description: &str) -> Result<gst::Pipeline> {
    ensure_started()?;
    let element =
        gst::parse::launch(description).map_err(|e| BuildError::Parse(e.to_string()))?;
    match element.downcast::<gst::Pipeline>() {
        Ok(pipeline) => Ok(pipeline),
        Err(element) => {
            let pipeline = gst::Pipeline::new();
            pipeline
                .add(&element)
                .map_err(|e| BuildError::Parse(e.to_string()))?;
            Ok(pipeline)
        }
    }
}

/// True when every named element factory is registered.
pub fn has_elements(factories: &[&str]) -> bool {
    if ensure_started().is_err() {
        return false;
    }
    factories
        .iter()
        .all(|name| gst::ElementFactory::find(name).is_some())
}

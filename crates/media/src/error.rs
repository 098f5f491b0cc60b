use std::time::Duration;

use crate::roles::Role;
use crate::state::GraphState;

pub type Result<T> = std::result::Result<T, StreamerError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("unknown placeholder {{{{{0}}}}}")]
    UnknownPlaceholder(String),

    #[error("no element name configured for role {0}")]
    UnmappedRole(Role),

    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("failed to parse pipeline description: {0}")]
    Parse(String),

    #[error("the mandatory {0} element is missing from the pipeline")]
    MissingMandatoryOutput(String),

    #[error("element {0} is not an appsink")]
    OutputNotAppSink(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("timed out after {waited:?} waiting for state {target:?}")]
    Timeout { target: GraphState, waited: Duration },

    #[error("state change rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    #[error("the pipeline is not seekable")]
    Unsupported,

    #[error("seek to {0:?} failed")]
    Failed(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("no {0} element in the pipeline")]
    RoleMissing(Role),

    #[error("element {element} has no property {property}")]
    NotFound { element: String, property: String },

    #[error("{property} value {value} is out of range")]
    OutOfRange { property: String, value: String },

    #[error("property {property} has type {expected}, got {actual}")]
    WrongType {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("the image encoder is not jpegenc or pngenc, it is {0}")]
    UnsupportedEncoder(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    #[error("no pipeline")]
    NoGraph,

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Seek(#[from] SeekError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error("the position is not available")]
    PositionUnavailable,

    #[error("the duration is not available")]
    DurationUnavailable,

    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid location {0:?}")]
    InvalidLocation(String),

    #[error("failed to initialize GStreamer: {0}")]
    Init(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

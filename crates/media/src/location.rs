use std::path::Path;

use url::Url;

use crate::config::max_lateness_ns;
use crate::controller::PipelineController;
use crate::error::{Result, StreamerError};
use crate::template::{quote, GraphTemplate};

const FILE_TEMPLATE: &str = r#"
    # demux the file
    filesrc name={{Input}} location={{location}} !
    decodebin name={{Decoder}} use-buffering=true

    # video
    {{Decoder}}. !
    queue max-size-buffers=0 max-size-time={{max_lateness}} !
    videoconvert !
    videorate name={{RateLimiter}} !
    videoscale !
    videobalance name={{ColorBalance}} !
    jpegenc name={{FrameEncoder}} !
    appsink name={{AppOutput}} sync=true max-lateness={{max_lateness}}

    # sound
    {{Decoder}}. !
    queue max-size-buffers=0 max-size-time={{max_lateness}} !
    audioconvert !
    audioresample !
    volume name={{VolumeControl}} !
    autoaudiosink sync=true
"#;

const NETWORK_TEMPLATE: &str = r#"
    # network stream
    souphttpsrc name={{Input}} location={{location}} !
    decodebin name={{Decoder}} use-buffering=true

    # video
    {{Decoder}}. !
    queue !
    videoconvert !
    videoscale !
    videorate name={{RateLimiter}} !
    videobalance name={{ColorBalance}} !
    jpegenc name={{FrameEncoder}} !
    appsink name={{AppOutput}} sync=true max-lateness={{max_lateness}}

    # sound
    {{Decoder}}. !
    queue !
    audioconvert !
    audioresample !
    volume name={{VolumeControl}} !
    autoaudiosink sync=true
"#;

/// Picks the pipeline template for `location` by URL scheme.
pub fn location_template(location: &str, rate: u32) -> Result<GraphTemplate> {
    let url = Url::parse(location)
        .map_err(|e| StreamerError::InvalidLocation(format!("{location}: {e}")))?;

    let (text, target) = match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| StreamerError::InvalidLocation(location.to_string()))?;
            (FILE_TEMPLATE, path.to_string_lossy().into_owned())
        }
        "http" | "https" => (NETWORK_TEMPLATE, url.to_string()),
        other => return Err(StreamerError::UnsupportedScheme(other.to_string())),
    };

    Ok(GraphTemplate::new(text)
        .param("location", quote(&target))
        .param("max_lateness", max_lateness_ns(rate)))
}

impl PipelineController {
    /// Opens a `file://`, `http://` or `https://` location with a decoding
    /// pipeline that feeds jpeg frames to the appsink and plays the sound on
    /// the default audio output.
    pub fn open(&self, location: &str) -> Result<()> {
        let template = location_template(location, self.max_rate())?;
        tracing::info!(%location, "opening");
        self.set_pipeline_from_template(&template)
    }

    /// Opens a local file. Relative paths are resolved against the working
    /// directory.
    pub fn open_path(&self, path: &Path) -> Result<()> {
        let absolute = std::path::absolute(path)
            .map_err(|e| StreamerError::InvalidLocation(format!("{}: {e}", path.display())))?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| StreamerError::InvalidLocation(absolute.display().to_string()))?;
        self.open(url.as_str())
    }
}

use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer_video as gst_video;
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("sample has no buffer")]
    NoBuffer,

    #[error("failed to map buffer: {0}")]
    Map(String),

    #[error("invalid caps: {0}")]
    Caps(String),

    #[error("unsupported raw format {0}")]
    UnsupportedFormat(String),

    #[error("buffer too small for {width}x{height}")]
    Truncated { width: u32, height: u32 },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: Arc<image::RgbaImage>,
    /// Increases by one with every frame published to the slot.
    pub serial: u64,
}

/// Latest-wins holder of the last decoded frame, together with the position
/// and frame size reported for the pipeline that produced it.
///
/// Writers pass the generation of the pipeline they belong to; writes from a
/// replaced pipeline are ignored.
#[derive(Debug, Default)]
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
}

#[derive(Debug, Default)]
struct SlotInner {
    generation: u64,
    frame: Option<VideoFrame>,
    serial: u64,
    position: Duration,
    size: (u32, u32),
    decode_failures: u64,
}

impl FrameSlot {
    pub fn latest(&self) -> Option<VideoFrame> {
        self.inner.lock().frame.clone()
    }

    pub fn serial(&self) -> u64 {
        self.inner.lock().serial
    }

    pub fn decode_failures(&self) -> u64 {
        self.inner.lock().decode_failures
    }

    pub fn position(&self) -> Duration {
        self.inner.lock().position
    }

    pub fn size(&self) -> (u32, u32) {
        self.inner.lock().size
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Clears everything and starts a new generation.
    pub(crate) fn reset(&self) -> u64 {
        let mut inner = self.inner.lock();
        let generation = inner.generation.wrapping_add(1);
        *inner = SlotInner {
            generation,
            serial: inner.serial,
            ..SlotInner::default()
        };
        generation
    }

    pub(crate) fn publish(&self, generation: u64, image: image::RgbaImage) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.serial += 1;
        inner.frame = Some(VideoFrame {
            image: Arc::new(image),
            serial: inner.serial,
        });
        true
    }

    pub(crate) fn record_decode_failure(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.decode_failures += 1;
        }
    }

    /// Position to report with a newly published frame: `reported` moves the
    /// position forward, and without a report the last known one is kept.
    pub(crate) fn frame_position(
        &self,
        generation: u64,
        reported: Option<Duration>,
    ) -> Option<Duration> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }
        if let Some(position) = reported {
            inner.position = inner.position.max(position);
        }
        Some(inner.position)
    }

    pub(crate) fn reset_position(&self, generation: u64, position: Duration) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.position = position;
        }
    }

    pub(crate) fn set_size(&self, generation: u64, width: u32, height: u32) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.size = (width, height);
        }
    }
}

/// Decodes an appsink sample. Encoded images (JPEG, PNG, ...) go through the
/// `image` codecs; packed 8-bit RGB(A) raw video is copied row by row.
pub fn decode_sample(sample: &gst::SampleRef) -> Result<image::RgbaImage, FrameError> {
    let buffer = sample.buffer().ok_or(FrameError::NoBuffer)?;
    let map = buffer
        .map_readable()
        .map_err(|e| FrameError::Map(e.to_string()))?;

    if let Some(caps) = sample.caps() {
        if caps.structure(0).is_some_and(|s| s.has_name("video/x-raw")) {
            return decode_raw(caps, map.as_slice());
        }
    }
    decode_encoded(map.as_slice())
}

pub fn decode_encoded(data: &[u8]) -> Result<image::RgbaImage, FrameError> {
    Ok(image::load_from_memory(data)?.to_rgba8())
}

fn decode_raw(caps: &gst::CapsRef, data: &[u8]) -> Result<image::RgbaImage, FrameError> {
    use gst_video::VideoFormat;

    let info = gst_video::VideoInfo::from_caps(caps).map_err(|e| FrameError::Caps(e.to_string()))?;
    let (swap, opaque) = match info.format() {
        VideoFormat::Rgba => (false, false),
        VideoFormat::Rgbx => (false, true),
        VideoFormat::Bgra => (true, false),
        VideoFormat::Bgrx => (true, true),
        other => return Err(FrameError::UnsupportedFormat(format!("{other:?}"))),
    };

    let width = info.width();
    let height = info.height();
    let truncated = FrameError::Truncated { width, height };
    let row_bytes = width as usize * 4;
    let stride = usize::try_from(info.stride()[0]).map_err(|_| FrameError::Caps("negative stride".into()))?;
    let offset = info.offset()[0];

    let mut rgba = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = offset + y * stride;
        let Some(row) = data.get(start..start + row_bytes) else {
            return Err(truncated);
        };
        for px in row.chunks_exact(4) {
            let (r, g, b) = if swap {
                (px[2], px[1], px[0])
            } else {
                (px[0], px[1], px[2])
            };
            let a = if opaque { 255 } else { px[3] };
            rgba.extend_from_slice(&[r, g, b, a]);
        }
    }

    image::RgbaImage::from_raw(width, height, rgba).ok_or(truncated)
}

/// Reads `width`/`height` from the first structure of `caps`.
pub(crate) fn caps_dimensions(caps: &gst::CapsRef) -> Option<(u32, u32)> {
    let s = caps.structure(0)?;
    let width = s.get::<i32>("width").ok()?;
    let height = s.get::<i32>("height").ok()?;
    Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
}

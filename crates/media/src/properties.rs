use std::sync::atomic::Ordering;

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;

use crate::config::max_lateness_ns;
use crate::controller::PipelineController;
use crate::error::{PropertyError, Result, StreamerError};
use crate::roles::Role;

/// `videobalance` settings. Writes outside a field's range are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceParameters {
    /// 0.0..=2.0, neutral 1.0
    pub contrast: f64,
    /// -1.0..=1.0, neutral 0.0
    pub brightness: f64,
    /// -1.0..=1.0, neutral 0.0
    pub hue: f64,
    /// 0.0..=2.0, neutral 1.0
    pub saturation: f64,
}

impl Default for BalanceParameters {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            brightness: 0.0,
            hue: 0.0,
            saturation: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Balance {
    Contrast,
    Brightness,
    Hue,
    Saturation,
}

impl Balance {
    fn property(self) -> &'static str {
        match self {
            Balance::Contrast => "contrast",
            Balance::Brightness => "brightness",
            Balance::Hue => "hue",
            Balance::Saturation => "saturation",
        }
    }

    fn accepts(self, value: f64) -> bool {
        let range = match self {
            Balance::Contrast | Balance::Saturation => 0.0..=2.0,
            Balance::Brightness | Balance::Hue => -1.0..=1.0,
        };
        range.contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderKind {
    Jpeg,
    Png,
}

impl EncoderKind {
    fn from_factory(name: &str) -> Option<Self> {
        match name {
            "jpegenc" => Some(EncoderKind::Jpeg),
            "pngenc" => Some(EncoderKind::Png),
            _ => None,
        }
    }
}

/// pngenc `compression-level` for a 0..=100 quality: 0 is best, 9 worst.
pub fn png_compression_level(quality: u8) -> u32 {
    9 - (u32::from(quality.min(100)) * 9 / 100)
}

fn get_checked<T>(element: &gst::Element, property: &str) -> std::result::Result<T, PropertyError>
where
    T: for<'a> glib::value::FromValue<'a> + 'static,
{
    let pspec = element
        .find_property(property)
        .ok_or_else(|| PropertyError::NotFound {
            element: element.name().to_string(),
            property: property.to_string(),
        })?;
    let value = element.property_value(property);
    value.get::<T>().map_err(|_| PropertyError::WrongType {
        property: property.to_string(),
        expected: pspec.value_type().name().to_string(),
        actual: std::any::type_name::<T>().to_string(),
    })
}

fn set_checked(
    element: &gst::Element,
    property: &str,
    value: glib::Value,
) -> std::result::Result<(), PropertyError> {
    let pspec = element
        .find_property(property)
        .ok_or_else(|| PropertyError::NotFound {
            element: element.name().to_string(),
            property: property.to_string(),
        })?;
    if !value.type_().is_a(pspec.value_type()) {
        return Err(PropertyError::WrongType {
            property: property.to_string(),
            expected: pspec.value_type().name().to_string(),
            actual: value.type_().name().to_string(),
        });
    }
    element.set_property_from_value(property, &value);
    Ok(())
}

impl PipelineController {
    fn element(&self, role: Role) -> Option<gst::Element> {
        let graph = self.shared().graph.lock().clone()?;
        let element = graph.elements.get(role).cloned();
        if element.is_none() {
            tracing::debug!(%role, "no element for role");
        }
        element
    }

    fn required(&self, role: Role) -> Result<gst::Element> {
        if self.shared().graph.lock().is_none() {
            return Err(StreamerError::NoGraph);
        }
        self.element(role)
            .ok_or_else(|| PropertyError::RoleMissing(role).into())
    }

    fn read_or_default<T>(&self, role: Role, property: &str) -> T
    where
        T: for<'a> glib::value::FromValue<'a> + Default + 'static,
    {
        let Some(element) = self.element(role) else {
            return T::default();
        };
        get_checked(&element, property).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read property");
            T::default()
        })
    }

    fn write_or_ignore(&self, role: Role, property: &str, value: glib::Value) {
        let Some(element) = self.element(role) else {
            return;
        };
        if let Err(e) = set_checked(&element, property, value) {
            tracing::warn!(error = %e, "failed to write property");
        }
    }

    /// Volume in 0.0..=1.0, or 0.0 without a volume element.
    pub fn volume(&self) -> f64 {
        self.read_or_default(Role::VolumeControl, "volume")
    }

    /// Ignored outside 0.0..=1.0 or without a volume element.
    pub fn set_volume(&self, volume: f64) {
        if !(0.0..=1.0).contains(&volume) {
            return;
        }
        self.write_or_ignore(Role::VolumeControl, "volume", volume.to_value());
    }

    pub fn is_muted(&self) -> bool {
        self.read_or_default(Role::VolumeControl, "mute")
    }

    pub fn set_muted(&self, muted: bool) {
        self.write_or_ignore(Role::VolumeControl, "mute", muted.to_value());
    }

    pub fn mute(&self) {
        self.set_muted(true);
    }

    pub fn unmute(&self) {
        self.set_muted(false);
    }

    pub fn toggle_mute(&self) {
        self.set_muted(!self.is_muted());
    }

    fn balance(&self, which: Balance) -> f64 {
        self.read_or_default(Role::ColorBalance, which.property())
    }

    fn set_balance(&self, which: Balance, value: f64) {
        if !which.accepts(value) {
            return;
        }
        self.write_or_ignore(Role::ColorBalance, which.property(), value.to_value());
    }

    pub fn contrast(&self) -> f64 {
        self.balance(Balance::Contrast)
    }

    pub fn set_contrast(&self, contrast: f64) {
        self.set_balance(Balance::Contrast, contrast);
    }

    pub fn brightness(&self) -> f64 {
        self.balance(Balance::Brightness)
    }

    pub fn set_brightness(&self, brightness: f64) {
        self.set_balance(Balance::Brightness, brightness);
    }

    pub fn hue(&self) -> f64 {
        self.balance(Balance::Hue)
    }

    pub fn set_hue(&self, hue: f64) {
        self.set_balance(Balance::Hue, hue);
    }

    pub fn saturation(&self) -> f64 {
        self.balance(Balance::Saturation)
    }

    pub fn set_saturation(&self, saturation: f64) {
        self.set_balance(Balance::Saturation, saturation);
    }

    /// All four balance values; zeros without a balance element.
    pub fn video_balance(&self) -> BalanceParameters {
        BalanceParameters {
            contrast: self.contrast(),
            brightness: self.brightness(),
            hue: self.hue(),
            saturation: self.saturation(),
        }
    }

    /// Applies each field on its own; out-of-range fields are skipped.
    pub fn set_video_balance(&self, balance: BalanceParameters) {
        self.set_contrast(balance.contrast);
        self.set_brightness(balance.brightness);
        self.set_hue(balance.hue);
        self.set_saturation(balance.saturation);
    }

    pub fn max_rate(&self) -> u32 {
        self.shared().rate.load(Ordering::Relaxed)
    }

    pub fn quality(&self) -> u8 {
        self.shared().quality.load(Ordering::Relaxed)
    }

    /// Limits the frame rate on the rate limiter element and sets the appsink
    /// `max-lateness` to one frame interval, in nanoseconds.
    pub fn set_max_rate(&self, rate: u32) -> Result<()> {
        if rate == 0 || rate > i32::MAX as u32 {
            return Err(PropertyError::OutOfRange {
                property: "max-rate".into(),
                value: rate.to_string(),
            }
            .into());
        }
        let limiter = self.required(Role::RateLimiter)?;
        set_checked(&limiter, "max-rate", (rate as i32).to_value())?;
        self.shared().rate.store(rate, Ordering::Relaxed);
        self.push_max_lateness()
    }

    /// Sets the image encoder quality. jpegenc takes it as `quality`, pngenc as
    /// an inverted `compression-level`.
    pub fn set_quality(&self, quality: u8) -> Result<()> {
        if quality > 100 {
            return Err(PropertyError::OutOfRange {
                property: "quality".into(),
                value: quality.to_string(),
            }
            .into());
        }
        let encoder = self.required(Role::FrameEncoder)?;
        let factory = encoder
            .factory()
            .map(|f| f.name().to_string())
            .unwrap_or_default();
        match EncoderKind::from_factory(&factory) {
            Some(EncoderKind::Jpeg) => {
                set_checked(&encoder, "quality", i32::from(quality).to_value())?;
            }
            Some(EncoderKind::Png) => {
                set_checked(
                    &encoder,
                    "compression-level",
                    png_compression_level(quality).to_value(),
                )?;
            }
            None => return Err(PropertyError::UnsupportedEncoder(factory).into()),
        }
        self.shared().quality.store(quality, Ordering::Relaxed);
        self.push_max_lateness()
    }

    fn push_max_lateness(&self) -> Result<()> {
        let graph = self.shared().current_graph()?;
        let lateness = max_lateness_ns(self.max_rate());
        set_checked(graph.output.upcast_ref(), "max-lateness", lateness.to_value())?;
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical function of an element inside a pipeline. Each role maps to a fixed
/// element name that templates reference with `{{Role}}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Input,
    Decoder,
    /// The `appsink` frames are pulled from. The only mandatory role.
    AppOutput,
    RateLimiter,
    FrameEncoder,
    VolumeControl,
    ColorBalance,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Input,
        Role::Decoder,
        Role::AppOutput,
        Role::RateLimiter,
        Role::FrameEncoder,
        Role::VolumeControl,
        Role::ColorBalance,
    ];

    /// Placeholder key used in templates, e.g. `{{AppOutput}}`.
    pub fn key(self) -> &'static str {
        match self {
            Role::Input => "Input",
            Role::Decoder => "Decoder",
            Role::AppOutput => "AppOutput",
            Role::RateLimiter => "RateLimiter",
            Role::FrameEncoder => "FrameEncoder",
            Role::VolumeControl => "VolumeControl",
            Role::ColorBalance => "ColorBalance",
        }
    }

    fn legacy_key(self) -> &'static str {
        match self {
            Role::Input => "InputElementName",
            Role::Decoder => "DecodeElementName",
            Role::AppOutput => "AppSinkElementName",
            Role::RateLimiter => "VideoRateElementName",
            Role::FrameEncoder => "ImageEncoderElementName",
            Role::VolumeControl => "VolumeElementName",
            Role::ColorBalance => "VideoBalanceElementName",
        }
    }

    /// Resolves a placeholder key. Older `*ElementName` keys are accepted too.
    pub fn from_key(key: &str) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|r| r.key() == key || r.legacy_key() == key)
    }

    pub fn default_element_name(self) -> &'static str {
        match self {
            Role::Input => "streamer-input",
            Role::Decoder => "streamer-decode",
            Role::AppOutput => "streamer-app",
            Role::RateLimiter => "streamer-videorate",
            Role::FrameEncoder => "streamer-imageencoder",
            Role::VolumeControl => "streamer-volume",
            Role::ColorBalance => "streamer-videobalance",
        }
    }

    pub fn is_mandatory(self) -> bool {
        matches!(self, Role::AppOutput)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Role → element name map handed to the template renderer and used to look
/// elements up once a pipeline is built.
///
/// A deserialized map overrides the defaults role by role; roles it leaves out
/// keep their default names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Role, String>")]
pub struct RoleNames(BTreeMap<Role, String>);

impl From<BTreeMap<Role, String>> for RoleNames {
    fn from(overrides: BTreeMap<Role, String>) -> Self {
        let mut names = Self::default();
        names.0.extend(overrides);
        names
    }
}

impl Default for RoleNames {
    fn default() -> Self {
        Self(
            Role::ALL
                .into_iter()
                .map(|r| (r, r.default_element_name().to_string()))
                .collect(),
        )
    }
}

impl RoleNames {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        self.0.get(&role).map(String::as_str)
    }

    /// Name the element of `role` is looked up by; falls back to the default.
    pub fn element_name(&self, role: Role) -> &str {
        self.get(role).unwrap_or(role.default_element_name())
    }

    pub fn set(&mut self, role: Role, name: impl Into<String>) {
        self.0.insert(role, name.into());
    }

    pub fn with(mut self, role: Role, name: impl Into<String>) -> Self {
        self.set(role, name);
        self
    }
}

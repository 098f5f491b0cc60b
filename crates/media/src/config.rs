use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamerError};
use crate::roles::RoleNames;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Target frame rate; drives the appsink `max-lateness`.
    pub frame_rate: u32,
    /// Image encoder quality, 0..=100.
    pub image_quality: u8,
    pub state_timeout_ms: u64,
    /// Each of the two pauses of the end-of-stream rewind.
    pub eos_rewind_delay_ms: u64,
    pub roles: RoleNames,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            image_quality: 85,
            state_timeout_ms: 1000,
            eos_rewind_delay_ms: 100,
            roles: RoleNames::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| StreamerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StreamerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(StreamerError::Config("frame_rate must be positive".into()));
        }
        if self.image_quality > 100 {
            return Err(StreamerError::Config(format!(
                "image_quality {} is above 100",
                self.image_quality
            )));
        }
        Ok(())
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.state_timeout_ms)
    }

    pub fn eos_rewind_delay(&self) -> Duration {
        Duration::from_millis(self.eos_rewind_delay_ms)
    }
}

/// Maximum lateness in nanoseconds tolerated by the appsink for `rate` fps:
/// one frame interval.
pub fn max_lateness_ns(rate: u32) -> i64 {
    1_000_000_000 / i64::from(rate.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ControllerConfig::from_json_str(r#"{ "frame_rate": 25 }"#).unwrap();
        assert_eq!(config.frame_rate, 25);
        assert_eq!(config.image_quality, 85);
        assert_eq!(config.state_timeout(), Duration::from_secs(1));
        assert_eq!(config.roles, RoleNames::default());
    }

    #[test]
    fn role_names_are_overridable() {
        let config =
            ControllerConfig::from_json_str(r#"{ "roles": { "AppOutput": "sink0" } }"#).unwrap();
        assert_eq!(config.roles.get(Role::AppOutput), Some("sink0"));
        assert_eq!(config.roles.get(Role::Input), Some("streamer-input"));

        let rendered = crate::template::render(
            "filesrc name={{Input}} ! appsink name={{AppOutput}}",
            &config.roles,
        )
        .unwrap();
        assert_eq!(rendered, "filesrc name=streamer-input ! appsink name=sink0");
    }

    #[test]
    fn rejects_zero_rate_and_high_quality() {
        assert!(ControllerConfig::from_json_str(r#"{ "frame_rate": 0 }"#).is_err());
        assert!(ControllerConfig::from_json_str(r#"{ "image_quality": 101 }"#).is_err());
        assert!(ControllerConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn lateness_is_one_frame_interval() {
        assert_eq!(max_lateness_ns(30), 33_333_333);
        assert_eq!(max_lateness_ns(1), 1_000_000_000);
        assert_eq!(max_lateness_ns(0), 1_000_000_000);
    }
}

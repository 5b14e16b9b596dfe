//! Renderer Settings
//!
//! Plain configuration consumed by [`FrameRenderer`](super::FrameRenderer)
//! and [`VolumeGridHelper`](crate::helpers::VolumeGridHelper). Every field
//! has a default, so a settings file only needs to name what it changes:
//!
//! ```rust,ignore
//! let settings = RendererSettings::from_json_str(r#"{ "sample_rate": 120, "log_fps": true }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VolumetraError};
use crate::volume::partition::PartitionPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// RGBA color the viewport is cleared to at the start of every frame.
    pub clear_color: [f32; 4],

    /// Upper bound of a single volume segment's texture, in bytes.
    pub max_segment_bytesize: usize,

    pub partition_policy: PartitionPolicy,

    /// Ray marching samples per unit of segment extent.
    pub sample_rate: u32,

    /// Video memory the headless device may hand out; unlimited if unset.
    pub video_memory_budget: Option<usize>,

    /// Logs the frame rate once per second.
    pub log_fps: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_segment_bytesize: 2 * 300 * 300 * 300,
            partition_policy: PartitionPolicy::default(),
            sample_rate: 200,
            video_memory_budget: None,
            log_fps: false,
        }
    }
}

impl RendererSettings {
    /// Parses settings from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VolumetraError::Configuration("sample_rate must be positive".into()));
        }
        if self.max_segment_bytesize == 0 {
            return Err(VolumetraError::Configuration(
                "max_segment_bytesize must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_keep_defaults() {
        let settings = RendererSettings::from_json_str(r#"{ "sample_rate": 64 }"#).unwrap();
        assert_eq!(settings.sample_rate, 64);
        assert_eq!(settings.max_segment_bytesize, 2 * 300 * 300 * 300);
        assert_eq!(settings.partition_policy, PartitionPolicy::MaximalSegments);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        assert!(matches!(
            RendererSettings::from_json_str(r#"{ "sample_rate": 0 }"#),
            Err(VolumetraError::Configuration(_))
        ));
        assert!(matches!(
            RendererSettings::from_json_str("{ not json"),
            Err(VolumetraError::Json(_))
        ));
    }

    #[test]
    fn policy_uses_snake_case() {
        let settings = RendererSettings::from_json_str(r#"{ "partition_policy": "balanced" }"#).unwrap();
        assert_eq!(settings.partition_policy, PartitionPolicy::Balanced);
    }
}

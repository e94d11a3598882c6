//! Editor tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Session configuration. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Screen-space distance (px) within which a dragged object snaps.
    pub snap_threshold: f64,
    /// Minimum time between guide updates.
    pub guide_interval_ms: u64,
    /// Continuous edits commit at most once per this window.
    pub commit_coalesce_ms: u64,
    /// Minimum time between history thumbnails.
    pub thumbnail_interval_ms: u64,
    pub thumbnail_scale: f64,
    /// Edge of the square layer previews, in pixels.
    pub layer_thumbnail_size: u32,
    pub max_history: usize,
    /// Offset applied to duplicated layers on both axes.
    pub duplicate_offset: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap_threshold: 10.0,
            guide_interval_ms: 16,
            commit_coalesce_ms: 500,
            thumbnail_interval_ms: 3000,
            thumbnail_scale: 0.4,
            layer_thumbnail_size: 60,
            max_history: 50,
            duplicate_offset: 10.0,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.snap_threshold.is_finite() && self.snap_threshold >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "snap_threshold",
                reason: format!("{} is not a non-negative distance", self.snap_threshold),
            });
        }
        if !(self.thumbnail_scale > 0.0 && self.thumbnail_scale <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "thumbnail_scale",
                reason: format!("{} is outside (0, 1]", self.thumbnail_scale),
            });
        }
        if self.max_history == 0 {
            return Err(ConfigError::Invalid {
                field: "max_history",
                reason: "must keep at least one entry".to_string(),
            });
        }
        Ok(())
    }

    pub fn guide_interval(&self) -> Duration {
        Duration::from_millis(self.guide_interval_ms)
    }

    pub fn commit_coalesce(&self) -> Duration {
        Duration::from_millis(self.commit_coalesce_ms)
    }

    pub fn thumbnail_interval(&self) -> Duration {
        Duration::from_millis(self.thumbnail_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let config = EditorConfig::from_json("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.commit_coalesce(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_override() {
        let config = EditorConfig::from_json(r#"{"snap_threshold": 4}"#).unwrap();
        assert_eq!(config.snap_threshold, 4.0);
        assert_eq!(config.max_history, 50);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            EditorConfig::from_json(r#"{"thumbnail_scale": 0}"#),
            Err(ConfigError::Invalid { field: "thumbnail_scale", .. })
        ));
        assert!(matches!(
            EditorConfig::from_json(r#"{"snap_threshold": "x"}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EditorConfig::from_json("nope"),
            Err(ConfigError::Parse(_))
        ));
    }
}

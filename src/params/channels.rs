//! Light channel configuration.

use serde::{Deserialize, Serialize};

use crate::error::{LightsError, Result};

/// Light channel layout and default thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelParams {
    /// Number of light channels on the controller (fixed for the process)
    pub channel_count: usize,

    /// Threshold used for any channel without a more specific value
    pub default_threshold: f32,

    /// Optional per-channel defaults; may be shorter than `channel_count`
    pub default_thresholds: Vec<f32>,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            channel_count: 32,
            default_threshold: 0.8,
            default_thresholds: Vec::new(),
        }
    }
}

impl ChannelParams {
    /// Default threshold for a single channel
    pub fn default_for(&self, index: usize) -> f32 {
        self.default_thresholds
            .get(index)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(LightsError::Config(
                "channel_count must be > 0".to_string(),
            ));
        }
        if !self.default_threshold.is_finite() {
            return Err(LightsError::Config(format!(
                "default_threshold must be finite, got {}",
                self.default_threshold
            )));
        }
        if let Some(bad) = self.default_thresholds.iter().find(|t| !t.is_finite()) {
            return Err(LightsError::Config(format!(
                "default_thresholds contains a non-finite value: {}",
                bad
            )));
        }
        Ok(())
    }
}

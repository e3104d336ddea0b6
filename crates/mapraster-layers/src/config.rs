use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("overscan_ratio must be >= 1, got {0}")]
    OverscanRatio(f64),

    #[error("render_resolution_multiplier must be finite and > 0, got {0}")]
    RenderResolutionMultiplier(f64),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Tuning knobs for a rasterizing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizingConfig {
    /// Quiet period after the last change before a pass starts.
    pub delay_ms: u64,
    /// Values above 1 render sharper bitmaps than the requested resolution.
    pub render_resolution_multiplier: f64,
    /// Size of the rasterized area relative to the requested extent.
    pub overscan_ratio: f64,
    /// Skip re-rendering while the view stays inside the last overscanned render.
    pub rerasterize_only_outside_overscan: bool,
}

impl Default for RasterizingConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            render_resolution_multiplier: 1.0,
            overscan_ratio: 1.0,
            rerasterize_only_outside_overscan: false,
        }
    }
}

impl RasterizingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_render_resolution_multiplier(mut self, multiplier: f64) -> Self {
        self.render_resolution_multiplier = multiplier;
        self
    }

    pub fn with_overscan_ratio(mut self, ratio: f64) -> Self {
        self.overscan_ratio = ratio;
        self
    }

    pub fn with_rerasterize_only_outside_overscan(mut self, enabled: bool) -> Self {
        self.rerasterize_only_outside_overscan = enabled;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overscan_ratio.is_nan() || self.overscan_ratio < 1.0 {
            return Err(ConfigError::OverscanRatio(self.overscan_ratio));
        }
        let m = self.render_resolution_multiplier;
        if !m.is_finite() || m <= 0.0 {
            return Err(ConfigError::RenderResolutionMultiplier(m));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse and validate a configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

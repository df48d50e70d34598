//! Configuration for the overlay pipeline

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Initial render-time confidence threshold in [0, 1]
    pub confidence_threshold: f32,
    /// Pixels between a label's anchor and the top of its box
    pub label_offset: f32,
    /// Display refresh rate the video loop paces itself to
    pub refresh_rate_hz: u32,
    /// Consecutive per-frame failures before the status message escalates
    pub failure_report_after: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.0,
            label_offset: 10.0,
            refresh_rate_hz: 60,
            failure_report_after: 5,
        }
    }
}

impl OverlayConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("Confidence threshold must be between 0 and 1".to_string());
        }

        if !self.label_offset.is_finite() {
            return Err("Label offset must be finite".to_string());
        }

        if self.refresh_rate_hz == 0 || self.refresh_rate_hz > 240 {
            return Err("Refresh rate must be between 1 and 240".to_string());
        }

        if self.failure_report_after == 0 {
            return Err("Failure report threshold must be at least 1".to_string());
        }

        Ok(())
    }

    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: OverlayConfig =
            toml::from_str(input).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate().map_err(Error::Configuration)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Time between frame-clock ticks.
    pub fn frame_interval(&self) -> std::time::Duration {
        let hz = self.refresh_rate_hz.max(1);
        std::time::Duration::from_secs_f64(1.0 / hz as f64)
    }
}

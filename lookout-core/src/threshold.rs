//! Externally settable confidence threshold, read once per render pass.

use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to the render-time confidence threshold.
///
/// Clones share the same value, so a UI control and the render path can each
/// hold one.
#[derive(Debug, Clone, Default)]
pub struct ThresholdControl {
    value: Arc<RwLock<f32>>,
}

impl ThresholdControl {
    pub fn new(value: f32) -> Self {
        Self {
            value: Arc::new(RwLock::new(sanitize(value))),
        }
    }

    pub fn get(&self) -> f32 {
        *self.value.read()
    }

    /// Set the threshold, clamped into `[0, 1]`. NaN becomes 0.
    pub fn set(&self, value: f32) {
        *self.value.write() = sanitize(value);
    }

    /// Set from raw text input. Anything unparseable means "draw everything".
    pub fn set_from_str(&self, input: &str) -> f32 {
        let value = parse_threshold(input);
        self.set(value);
        value
    }
}

/// Parse threshold text; unparseable input yields 0.
///
/// The whole trimmed text must be a number. Trailing characters are not
/// ignored, so `"0.5abc"` yields 0 rather than 0.5.
pub fn parse_threshold(input: &str) -> f32 {
    sanitize(input.trim().parse::<f32>().unwrap_or(0.0))
}

fn sanitize(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

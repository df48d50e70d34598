//! Error types for lookout-eye

use lookout_core::Error as CoreError;
use thiserror::Error;

/// Failures raised at the detector and media boundaries
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Unsupported media: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// A failed call is always a failed pass. Only a failed detector load makes
/// detection unavailable, and the controller builds that error itself.
impl From<DetectorError> for CoreError {
    fn from(err: DetectorError) -> Self {
        CoreError::DetectionCallFailed(err.to_string())
    }
}

//! lookout-core: data model and shared primitives for the detection overlay
//! pipeline.
//!
//! Everything here is synchronous and runtime-agnostic. The async pieces
//! (detector calls, the video loop) live in `lookout-eye`.

pub mod types;
pub mod error;
pub mod config;
pub mod threshold;
pub mod mapper;

pub use error::{Error, Result};
pub use types::{
    BoundingBox, Detection, DetectionBatch, Generation, HandleId, MediaKind, PassTicket,
    Prediction, Size,
};
pub use config::OverlayConfig;
pub use threshold::ThresholdControl;
pub use mapper::{map_to_overlay, OverlayBox, ScaleFactors};

//! lookout-eye: detection overlay pipeline
//!
//! Runs an opaque async detector against the active image or video, maps its
//! boxes onto the displayed media, and keeps the overlay in step with the
//! media session so stale results are never drawn.

pub mod clock;
pub mod controller;
pub mod detector;
pub mod error;
pub mod media;
pub mod overlay;
pub mod raster;
pub mod session;
pub mod status;

pub use clock::{FrameClock, IntervalClock, YieldClock};
pub use controller::{ControllerBuilder, ControllerState, DetectionController, PassOutcome};
pub use detector::{Detector, DetectorAdapter, ReplayDetector};
pub use error::DetectorError;
pub use media::{
    ImageLoader, MediaElement, MediaHandle, MediaLoader, PlaybackEvent, PlaybackState, StillImage,
};
pub use overlay::{MemorySurface, OverlayManager, OverlayPrimitive, OverlaySurface};
pub use raster::RasterSurface;
pub use session::MediaSession;
pub use status::{ChannelStatus, LogStatus, MemoryStatus, StatusMessage, StatusSink};

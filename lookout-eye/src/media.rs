//! Media elements and the handles the pipeline holds on them

use crate::error::DetectorError;
use image::DynamicImage;
use lookout_core::{HandleId, MediaKind, Size};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Playback state reported by a media element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Still media; never plays
    Static,
    Playing,
    Paused,
    Ended,
}

/// Playback events the controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Play,
    Playing,
    Pause,
    Ended,
}

/// A decoded, displayable media item (image or video).
///
/// Sizes are read live: `rendered_size` may change whenever the display is
/// resized, and the pipeline reads it again on every render pass.
pub trait MediaElement: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn name(&self) -> &str;

    /// Intrinsic pixel dimensions; zero until decoded
    fn native_size(&self) -> Size;

    /// Current on-screen dimensions
    fn rendered_size(&self) -> Size;

    fn playback(&self) -> PlaybackState {
        PlaybackState::Static
    }

    /// Current frame index for video, `None` for stills
    fn position(&self) -> Option<u64> {
        None
    }

    /// Release transient resources. Called once when the element is replaced.
    fn release(&self) {}
}

/// Reference to the one active media item
#[derive(Clone)]
pub struct MediaHandle {
    id: HandleId,
    element: Arc<dyn MediaElement>,
}

impl MediaHandle {
    pub fn new(element: Arc<dyn MediaElement>) -> Self {
        Self {
            id: HandleId::new(),
            element,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }

    pub fn kind(&self) -> MediaKind {
        self.element.kind()
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn native_size(&self) -> Size {
        self.element.native_size()
    }

    pub fn rendered_size(&self) -> Size {
        self.element.rendered_size()
    }

    /// Decoded far enough to query: an image with pixels, or a video with
    /// at least one frame.
    pub fn is_ready(&self) -> bool {
        !self.element.native_size().is_empty()
    }

    pub fn playback(&self) -> PlaybackState {
        self.element.playback()
    }

    pub fn is_playing(&self) -> bool {
        self.element.playback() == PlaybackState::Playing
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// Media loading boundary: raw bytes in, decoded element out
pub trait MediaLoader: Send + Sync {
    fn load(
        &self,
        kind: MediaKind,
        name: &str,
        bytes: &[u8],
    ) -> Result<Arc<dyn MediaElement>, DetectorError>;
}

/// Still image decoded with the `image` crate
pub struct StillImage {
    name: String,
    image: Arc<DynamicImage>,
    rendered: RwLock<Size>,
    released: AtomicBool,
}

impl StillImage {
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self, DetectorError> {
        let image = image::load_from_memory(bytes)?;
        debug!("Decoded {} at {}x{}", name, image.width(), image.height());
        Ok(Self::from_image(name, image))
    }

    pub fn from_image(name: &str, image: DynamicImage) -> Self {
        let native = Size::new(image.width(), image.height());
        Self {
            name: name.to_string(),
            image: Arc::new(image),
            rendered: RwLock::new(native),
            released: AtomicBool::new(false),
        }
    }

    pub fn image(&self) -> &Arc<DynamicImage> {
        &self.image
    }

    pub fn set_rendered_size(&self, size: Size) {
        *self.rendered.write() = size;
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl MediaElement for StillImage {
    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn native_size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    fn rendered_size(&self) -> Size {
        *self.rendered.read()
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// Loader for still images. Video needs an external decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageLoader;

impl MediaLoader for ImageLoader {
    fn load(
        &self,
        kind: MediaKind,
        name: &str,
        bytes: &[u8],
    ) -> Result<Arc<dyn MediaElement>, DetectorError> {
        match kind {
            MediaKind::Image => Ok(Arc::new(StillImage::decode(name, bytes)?)),
            MediaKind::Video => Err(DetectorError::Unsupported(format!(
                "{}: no video decoder configured",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_still_image_decode() {
        let still = StillImage::decode("dot.png", &png_bytes(32, 16)).unwrap();
        assert_eq!(still.native_size(), Size::new(32, 16));
        assert_eq!(still.rendered_size(), Size::new(32, 16));
        assert_eq!(still.playback(), PlaybackState::Static);
        assert_eq!(still.position(), None);
    }

    #[test]
    fn test_still_image_decode_garbage() {
        let err = StillImage::decode("junk.png", b"not an image").err().unwrap();
        assert!(matches!(err, DetectorError::Image(_)));
    }

    #[test]
    fn test_rendered_size_is_live() {
        let still = StillImage::from_image("a", DynamicImage::new_rgba8(10, 10));
        still.set_rendered_size(Size::new(20, 5));
        assert_eq!(still.rendered_size(), Size::new(20, 5));
        assert_eq!(still.native_size(), Size::new(10, 10));
    }

    #[test]
    fn test_handle_readiness() {
        let ready = MediaHandle::new(Arc::new(StillImage::from_image(
            "a",
            DynamicImage::new_rgba8(4, 4),
        )));
        assert!(ready.is_ready());
        assert!(!ready.is_playing());

        let empty = MediaHandle::new(Arc::new(StillImage::from_image(
            "b",
            DynamicImage::new_rgba8(0, 0),
        )));
        assert!(!empty.is_ready());
    }

    #[test]
    fn test_image_loader_rejects_video() {
        let err = ImageLoader
            .load(MediaKind::Video, "clip.mp4", &[0u8; 4])
            .err()
            .unwrap();
        assert!(matches!(err, DetectorError::Unsupported(_)));
    }

    #[test]
    fn test_image_loader_loads_image() {
        let element = ImageLoader
            .load(MediaKind::Image, "a.png", &png_bytes(3, 7))
            .unwrap();
        assert_eq!(element.kind(), MediaKind::Image);
        assert_eq!(element.name(), "a.png");
        assert_eq!(element.native_size(), Size::new(3, 7));
    }

    #[test]
    fn test_release_marks_image() {
        let still = StillImage::from_image("a", DynamicImage::new_rgba8(1, 1));
        assert!(!still.is_released());
        still.release();
        assert!(still.is_released());
    }
}

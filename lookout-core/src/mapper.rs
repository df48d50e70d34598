//! Detector space to overlay space.
//!
//! Detector boxes are aligned to the media's intrinsic resolution; overlay
//! boxes are aligned to whatever size the media is currently displayed at.
//! The two axes scale independently, so a stretched display stretches the
//! boxes with it.

use crate::error::{Error, Result};
use crate::types::{BoundingBox, MediaKind, Size};
use serde::{Deserialize, Serialize};

/// Box in overlay (rendered) pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-axis native-to-rendered scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors { x: 1.0, y: 1.0 };

    /// Scale from `native` to `rendered`.
    ///
    /// Fails with `MediaNotReady` when `native` has a zero dimension.
    pub fn between(native: Size, rendered: Size) -> Result<Self> {
        if native.is_empty() {
            return Err(Error::MediaNotReady(format!(
                "native size {}x{} has a zero dimension",
                native.width, native.height
            )));
        }
        Ok(Self {
            x: rendered.width as f32 / native.width as f32,
            y: rendered.height as f32 / native.height as f32,
        })
    }

    /// Scale for a media item. Still images are drawn 1:1 whatever their
    /// rendered size; only video is rescaled.
    pub fn for_media(kind: MediaKind, native: Size, rendered: Size) -> Result<Self> {
        match kind {
            MediaKind::Image => {
                if native.is_empty() {
                    return Err(Error::MediaNotReady("image not decoded".to_string()));
                }
                Ok(Self::IDENTITY)
            }
            MediaKind::Video => Self::between(native, rendered),
        }
    }

    pub fn apply(&self, bbox: &BoundingBox) -> OverlayBox {
        OverlayBox {
            x: bbox.x * self.x,
            y: bbox.y * self.y,
            width: bbox.width * self.x,
            height: bbox.height * self.y,
        }
    }
}

/// Map one native-space box onto the overlay.
pub fn map_to_overlay(bbox: &BoundingBox, native: Size, rendered: Size) -> Result<OverlayBox> {
    Ok(ScaleFactors::between(native, rendered)?.apply(bbox))
}

/// Vertical anchor for a label sitting `offset` pixels above its box.
pub fn label_anchor(overlay: &OverlayBox, offset: f32) -> (f32, f32) {
    (overlay.x, overlay.y - offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_axes() {
        let bbox = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let mapped = map_to_overlay(&bbox, Size::new(200, 100), Size::new(400, 100)).unwrap();
        assert_eq!(
            mapped,
            OverlayBox { x: 20.0, y: 10.0, width: 40.0, height: 20.0 }
        );
    }

    #[test]
    fn test_downscale() {
        let bbox = BoundingBox::new(100.0, 50.0, 200.0, 100.0);
        let mapped = map_to_overlay(&bbox, Size::new(1920, 1080), Size::new(960, 540)).unwrap();
        assert_eq!(mapped, OverlayBox { x: 50.0, y: 25.0, width: 100.0, height: 50.0 });
    }

    #[test]
    fn test_zero_native_is_not_ready() {
        let bbox = BoundingBox::new(1.0, 1.0, 1.0, 1.0);
        let err = map_to_overlay(&bbox, Size::new(0, 100), Size::new(100, 100)).unwrap_err();
        assert!(matches!(err, Error::MediaNotReady(_)));
    }

    #[test]
    fn test_still_image_is_identity() {
        let scale =
            ScaleFactors::for_media(MediaKind::Image, Size::new(200, 100), Size::new(50, 900))
                .unwrap();
        assert_eq!(scale, ScaleFactors::IDENTITY);
        let bbox = BoundingBox::new(3.0, 4.0, 5.0, 6.0);
        assert_eq!(scale.apply(&bbox), OverlayBox { x: 3.0, y: 4.0, width: 5.0, height: 6.0 });
    }

    #[test]
    fn test_video_scales() {
        let scale =
            ScaleFactors::for_media(MediaKind::Video, Size::new(200, 100), Size::new(400, 100))
                .unwrap();
        assert_eq!(scale, ScaleFactors { x: 2.0, y: 1.0 });
    }

    #[test]
    fn test_undecoded_image_is_not_ready() {
        let err = ScaleFactors::for_media(MediaKind::Image, Size::new(0, 0), Size::new(10, 10))
            .unwrap_err();
        assert!(matches!(err, Error::MediaNotReady(_)));
    }

    #[test]
    fn test_label_anchor() {
        let overlay = OverlayBox { x: 20.0, y: 10.0, width: 40.0, height: 20.0 };
        assert_eq!(label_anchor(&overlay, 10.0), (20.0, 0.0));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_identity_when_sizes_match(
                w in 1u32..4000, h in 1u32..4000,
                x in 0f32..1000.0, y in 0f32..1000.0,
                bw in 0f32..1000.0, bh in 0f32..1000.0,
            ) {
                let bbox = BoundingBox::new(x, y, bw, bh);
                let size = Size::new(w, h);
                let mapped = map_to_overlay(&bbox, size, size).unwrap();
                prop_assert_eq!(mapped, OverlayBox { x, y, width: bw, height: bh });
            }

            #[test]
            fn test_axes_do_not_interact(
                nw in 1u32..2000, nh in 1u32..2000,
                rw in 1u32..2000, rh in 1u32..2000,
                x in 0f32..500.0, bw in 0f32..500.0,
            ) {
                // y-axis sizes never change the x-axis result
                let bbox = BoundingBox::new(x, 7.0, bw, 7.0);
                let a = map_to_overlay(&bbox, Size::new(nw, nh), Size::new(rw, rh)).unwrap();
                let b = map_to_overlay(&bbox, Size::new(nw, 1), Size::new(rw, 1)).unwrap();
                prop_assert_eq!(a.x, b.x);
                prop_assert_eq!(a.width, b.width);
            }
        }
    }
}

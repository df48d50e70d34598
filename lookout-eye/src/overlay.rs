//! Overlay primitives and their lifecycle.
//!
//! The manager is the only owner of drawn primitives. Callers pair every
//! `render` with a preceding `clear`; `render` itself never clears, so two
//! renders without a clear would mix batches.

use lookout_core::mapper::label_anchor;
use lookout_core::{Detection, OverlayBox, ScaleFactors};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Surface-assigned identity of a drawn primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveId(pub u64);

/// Label text and its top-left anchor in overlay pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// A drawn box plus its label, derived from one detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayPrimitive {
    pub bbox: OverlayBox,
    pub label: OverlayLabel,
}

impl OverlayPrimitive {
    pub fn from_detection(detection: &Detection, scale: ScaleFactors, label_offset: f32) -> Self {
        let bbox = scale.apply(&detection.bbox);
        let (x, y) = label_anchor(&bbox, label_offset);
        Self {
            bbox,
            label: OverlayLabel {
                text: format!("{} ({})", detection.class_label, detection.percent()),
                x,
                y,
            },
        }
    }
}

/// Display boundary the overlay draws onto
pub trait OverlaySurface: Send {
    fn draw(&mut self, primitive: &OverlayPrimitive) -> PrimitiveId;

    fn erase(&mut self, id: PrimitiveId);
}

/// Owns the set of primitives currently on the surface
pub struct OverlayManager {
    surface: Box<dyn OverlaySurface>,
    tracked: Vec<(PrimitiveId, OverlayPrimitive)>,
}

impl OverlayManager {
    pub fn new(surface: Box<dyn OverlaySurface>) -> Self {
        Self {
            surface,
            tracked: Vec::new(),
        }
    }

    /// Erase everything drawn. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.tracked.is_empty() {
            return;
        }
        debug!("Clearing {} overlay primitives", self.tracked.len());
        for (id, _) in self.tracked.drain(..) {
            self.surface.erase(id);
        }
    }

    /// Draw one primitive per detection scoring strictly above `threshold`.
    /// Returns how many were drawn.
    pub fn render(
        &mut self,
        detections: &[Detection],
        scale: ScaleFactors,
        threshold: f32,
        label_offset: f32,
    ) -> usize {
        let mut drawn = 0;
        for detection in detections.iter().filter(|d| d.score > threshold) {
            let primitive = OverlayPrimitive::from_detection(detection, scale, label_offset);
            let id = self.surface.draw(&primitive);
            self.tracked.push((id, primitive));
            drawn += 1;
        }
        debug!("Rendered {} of {} detections", drawn, detections.len());
        drawn
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn primitives(&self) -> Vec<OverlayPrimitive> {
        self.tracked.iter().map(|(_, p)| p.clone()).collect()
    }
}

/// In-memory surface. Clones share the drawn set, so one clone can be handed
/// to the manager and another kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: u64,
    drawn: Vec<(PrimitiveId, OverlayPrimitive)>,
    draw_calls: u64,
    erase_calls: u64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primitives(&self) -> Vec<OverlayPrimitive> {
        self.inner.lock().drawn.iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().drawn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn labels(&self) -> Vec<String> {
        self.inner
            .lock()
            .drawn
            .iter()
            .map(|(_, p)| p.label.text.clone())
            .collect()
    }

    /// (draws, erases) since creation
    pub fn call_counts(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.draw_calls, inner.erase_calls)
    }
}

impl OverlaySurface for MemorySurface {
    fn draw(&mut self, primitive: &OverlayPrimitive) -> PrimitiveId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        inner.draw_calls += 1;
        let id = PrimitiveId(inner.next_id);
        inner.drawn.push((id, primitive.clone()));
        id
    }

    fn erase(&mut self, id: PrimitiveId) {
        let mut inner = self.inner.lock();
        inner.erase_calls += 1;
        inner.drawn.retain(|(drawn, _)| *drawn != id);
    }
}

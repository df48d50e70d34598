//! Raster overlay: paints primitives onto a copy of a frame.

use crate::overlay::{OverlayPrimitive, OverlaySurface, PrimitiveId};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::Arc;

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([255, 128, 0, 255]);
const LABEL_TAB_HEIGHT: u32 = 8;

/// Retains drawn primitives and composes them over a base frame on demand.
/// Clones share state.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    inner: Arc<Mutex<RasterInner>>,
    thickness: u32,
}

#[derive(Debug, Default)]
struct RasterInner {
    next_id: u64,
    drawn: Vec<(PrimitiveId, OverlayPrimitive)>,
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RasterSurface {
    pub fn new(thickness: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RasterInner::default())),
            thickness: thickness.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().drawn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paint every drawn primitive over `base`: a box outline plus a filled
    /// tab marking the label anchor.
    pub fn compose(&self, base: &RgbaImage) -> RgbaImage {
        let mut out = base.clone();
        let inner = self.inner.lock();
        for (_, primitive) in &inner.drawn {
            let b = &primitive.bbox;
            if let Some(rect) = to_pixels(b.x, b.y, b.x + b.width, b.y + b.height, out.dimensions()) {
                draw_rect(&mut out, rect, BOX_COLOR, self.thickness);
            }
            let tab_w = (primitive.label.text.len() as f32 * 4.0).max(4.0);
            let (lx, ly) = (primitive.label.x, primitive.label.y);
            if let Some(rect) = to_pixels(lx, ly, lx + tab_w, ly + LABEL_TAB_HEIGHT as f32, out.dimensions()) {
                fill_rect(&mut out, rect, LABEL_COLOR);
            }
        }
        out
    }
}

impl OverlaySurface for RasterSurface {
    fn draw(&mut self, primitive: &OverlayPrimitive) -> PrimitiveId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = PrimitiveId(inner.next_id);
        inner.drawn.push((id, primitive.clone()));
        id
    }

    fn erase(&mut self, id: PrimitiveId) {
        self.inner.lock().drawn.retain(|(drawn, _)| *drawn != id);
    }
}

/// Clamp an overlay-space rectangle into image pixels; `None` when nothing
/// of it is visible.
fn to_pixels(x0: f32, y0: f32, x1: f32, y1: f32, dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 || x1 < 0.0 || y1 < 0.0 || x0 >= w as f32 || y0 >= h as f32 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let rect = [clamp(x0, w), clamp(y0, h), clamp(x1, w), clamp(y1, h)];
    if rect[0] > rect[2] || rect[1] > rect[3] {
        return None;
    }
    Some(rect)
}

fn draw_rect(img: &mut RgbaImage, rect: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let [x0, y0, x1, y1] = rect;
    for t in 0..thickness {
        let (xx0, yy0) = (x0.saturating_add(t), y0.saturating_add(t));
        let (xx1, yy1) = (x1.saturating_sub(t), y1.saturating_sub(t));
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(img: &mut RgbaImage, rect: [u32; 4], color: Rgba<u8>) {
    let [x0, y0, x1, y1] = rect;
    for y in y0..=y1 {
        for x in x0..=x1 {
            img.put_pixel(x, y, color);
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one loaded media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(pub Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media session epoch, bumped on every media replacement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (nothing decoded yet).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned box in native media pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_xywh(xywh: [f32; 4]) -> Self {
        Self::new(xywh[0], xywh[1], xywh[2], xywh[3])
    }

    pub fn to_xywh(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// One predicted object instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            score,
            bbox,
        }
    }

    /// Score as a whole percentage, the way labels show it.
    pub fn percent(&self) -> i64 {
        (self.score * 100.0).round() as i64
    }
}

/// Detector wire format: `{"class": "...", "score": 0.9, "bbox": [x, y, w, h]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub score: f32,
    pub bbox: [f32; 4],
}

impl From<Prediction> for Detection {
    fn from(p: Prediction) -> Self {
        Detection::new(p.class, p.score, BoundingBox::from_xywh(p.bbox))
    }
}

impl From<&Detection> for Prediction {
    fn from(d: &Detection) -> Self {
        Prediction {
            class: d.class_label.clone(),
            score: d.score,
            bbox: d.bbox.to_xywh(),
        }
    }
}

/// Stamp identifying one issued detector call.
///
/// `sequence` grows strictly across the whole session, so two calls against
/// the same media and generation can still be ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassTicket {
    pub handle: HandleId,
    pub generation: Generation,
    pub sequence: u64,
}

/// Output of one detector call, tagged with the ticket it was issued under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub ticket: PassTicket,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(ticket: PassTicket, detections: Vec<Detection>) -> Self {
        Self { ticket, detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Detections in the detector's wire format, for raw dumps.
    pub fn predictions(&self) -> Vec<Prediction> {
        self.detections.iter().map(Prediction::from).collect()
    }
}

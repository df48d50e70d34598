//! Detector boundary.
//!
//! The detector is an opaque async classifier: media in, raw detections out,
//! coordinates in native media pixels. Nothing here retries or filters.

use crate::error::DetectorError;
use crate::media::MediaHandle;
use async_trait::async_trait;
use lookout_core::{DetectionBatch, Detection, PassTicket, Prediction, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Async object detector, stateless per call
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, media: &MediaHandle) -> std::result::Result<Vec<Detection>, DetectorError>;
}

/// Stamps raw detector output with the ticket it was issued under
#[derive(Clone)]
pub struct DetectorAdapter {
    detector: Arc<dyn Detector>,
}

impl DetectorAdapter {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self { detector }
    }

    /// Run one detection call. Failures come back as `DetectionCallFailed`.
    pub async fn detect(&self, ticket: PassTicket, media: &MediaHandle) -> Result<DetectionBatch> {
        debug!("Running detection for {} ({})", media.name(), ticket.generation);
        let detections = self.detector.detect(media).await?;
        debug!("Detected {} objects", detections.len());
        Ok(DetectionBatch::new(ticket, detections))
    }
}

/// Serves precomputed predictions, keyed by frame index.
///
/// Stills read frame 0. Frames without an entry yield an empty result.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: BTreeMap<u64, Vec<Detection>>,
}

impl ReplayDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predictions for a single still: `[{"class", "score", "bbox"}, ...]`
    pub fn from_predictions(predictions: Vec<Prediction>) -> Self {
        let mut replay = Self::new();
        replay.insert(0, predictions);
        replay
    }

    pub fn insert(&mut self, frame: u64, predictions: Vec<Prediction>) {
        self.frames
            .insert(frame, predictions.into_iter().map(Detection::from).collect());
    }

    /// Parse either a flat prediction array (one still) or an object mapping
    /// frame indices to prediction arrays.
    pub fn from_json(input: &str) -> std::result::Result<Self, DetectorError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        if value.is_array() {
            let predictions: Vec<Prediction> = serde_json::from_value(value)?;
            return Ok(Self::from_predictions(predictions));
        }

        let by_frame: BTreeMap<String, Vec<Prediction>> = serde_json::from_value(value)?;
        let mut replay = Self::new();
        for (key, predictions) in by_frame {
            let frame = key.parse::<u64>().map_err(|_| {
                DetectorError::Model(format!("frame key {:?} is not an index", key))
            })?;
            replay.insert(frame, predictions);
        }
        Ok(replay)
    }

    pub fn from_file(path: &Path) -> std::result::Result<Self, DetectorError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl Detector for ReplayDetector {
    async fn detect(&self, media: &MediaHandle) -> std::result::Result<Vec<Detection>, DetectorError> {
        let frame = media.element().position().unwrap_or(0);
        Ok(self.frames.get(&frame).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::StillImage;
    use image::DynamicImage;
    use lookout_core::{BoundingBox, Generation};

    fn still() -> MediaHandle {
        MediaHandle::new(Arc::new(StillImage::from_image(
            "still",
            DynamicImage::new_rgba8(8, 8),
        )))
    }

    struct Failing;

    #[async_trait]
    impl Detector for Failing {
        async fn detect(&self, _media: &MediaHandle) -> std::result::Result<Vec<Detection>, DetectorError> {
            Err(DetectorError::Inference("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_replay_flat_array() {
        let replay = ReplayDetector::from_json(
            r#"[{"class":"dog","score":0.7,"bbox":[1,2,3,4]}]"#,
        )
        .unwrap();
        let out = replay.detect(&still()).await.unwrap();
        assert_eq!(out, vec![Detection::new("dog", 0.7, BoundingBox::new(1.0, 2.0, 3.0, 4.0))]);
    }

    #[tokio::test]
    async fn test_replay_by_frame() {
        let replay = ReplayDetector::from_json(
            r#"{"0":[],"3":[{"class":"car","score":0.5,"bbox":[0,0,1,1]}]}"#,
        )
        .unwrap();
        assert_eq!(replay.frame_count(), 2);
        assert!(replay.detect(&still()).await.unwrap().is_empty());
    }

    #[test]
    fn test_replay_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"0":[{"class":"bird","score":0.66,"bbox":[4,4,2,2]}]}"#,
        )
        .unwrap();
        let replay = ReplayDetector::from_file(file.path()).unwrap();
        let out = tokio_test::block_on(replay.detect(&still())).unwrap();
        assert_eq!(out[0].class_label, "bird");
        assert_eq!(out[0].percent(), 66);

        let missing = ReplayDetector::from_file(Path::new("/nonexistent/predictions.json"));
        assert!(matches!(missing, Err(DetectorError::Io(_))));
    }

    #[test]
    fn test_replay_bad_frame_key() {
        let err = ReplayDetector::from_json(r#"{"first":[]}"#).unwrap_err();
        assert!(matches!(err, DetectorError::Model(_)));
    }

    #[tokio::test]
    async fn test_adapter_stamps_ticket() {
        let media = still();
        let adapter = DetectorAdapter::new(Arc::new(ReplayDetector::from_predictions(vec![
            Prediction { class: "cat".to_string(), score: 0.9, bbox: [0.0, 0.0, 2.0, 2.0] },
        ])));
        let ticket = PassTicket { handle: media.id(), generation: Generation(4), sequence: 9 };
        let batch = adapter.detect(ticket, &media).await.unwrap();
        assert_eq!(batch.ticket, ticket);
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_adapter_surfaces_failure() {
        let media = still();
        let adapter = DetectorAdapter::new(Arc::new(Failing));
        let ticket = PassTicket { handle: media.id(), generation: Generation(1), sequence: 1 };
        let err = adapter.detect(ticket, &media).await.unwrap_err();
        assert!(matches!(err, lookout_core::Error::DetectionCallFailed(_)));
    }
}

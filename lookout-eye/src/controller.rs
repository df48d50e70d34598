//! Detection loop controller.
//!
//! Drives one-shot detection for stills and a frame-paced loop for video.
//! Session, overlay and controller state sit behind one lock that is never
//! held across an `.await`; the detector call is the only suspension point
//! in a pass. Results are validated against the session when the call
//! resumes, so stale or superseded batches are dropped instead of drawn.

use crate::clock::{FrameClock, IntervalClock};
use crate::detector::{Detector, DetectorAdapter};
use crate::error::DetectorError;
use crate::media::{ImageLoader, MediaElement, MediaHandle, MediaLoader, PlaybackEvent};
use crate::overlay::{OverlayManager, OverlayPrimitive, OverlaySurface};
use crate::session::MediaSession;
use crate::status::{StatusMessage, StatusSink};
use lookout_core::{
    DetectionBatch, Error, Generation, MediaKind, OverlayConfig, PassTicket, Result, ScaleFactors,
    ThresholdControl,
};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    DetectingImage,
    DetectingVideoFrame,
    Stopped,
}

/// What happened to one detection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Batch replaced the overlay
    Applied { detected: usize, rendered: usize },
    /// Batch resolved after it went stale and was dropped
    Discarded,
    /// Media not decoded yet; nothing ran
    NotReady,
    /// Trigger does not apply (no media, wrong kind, model still loading)
    Ignored,
}

enum DetectorSlot {
    Loading,
    Ready(DetectorAdapter),
    Unavailable(String),
}

struct Shared {
    session: MediaSession,
    overlay: OverlayManager,
    state: ControllerState,
    /// Identifies the live video loop; bumped on every start and stop
    run: u64,
    images_in_flight: usize,
    consecutive_failures: u32,
}

struct Inner {
    shared: Mutex<Shared>,
    detector: RwLock<DetectorSlot>,
    loader: Arc<dyn MediaLoader>,
    clock: Arc<dyn FrameClock>,
    status: Arc<dyn StatusSink>,
    threshold: ThresholdControl,
    config: OverlayConfig,
    video_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`DetectionController`]
pub struct ControllerBuilder {
    config: OverlayConfig,
    surface: Box<dyn OverlaySurface>,
    status: Arc<dyn StatusSink>,
    clock: Option<Arc<dyn FrameClock>>,
    loader: Option<Arc<dyn MediaLoader>>,
    threshold: Option<ThresholdControl>,
    detector: Option<Arc<dyn Detector>>,
}

impl ControllerBuilder {
    pub fn clock(mut self, clock: Arc<dyn FrameClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn MediaLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Share an existing threshold control instead of creating one from the
    /// configured default.
    pub fn threshold(mut self, threshold: ThresholdControl) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Start with a ready detector instead of loading one later.
    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn build(self) -> Result<DetectionController> {
        self.config
            .validate()
            .map_err(|e| Error::Configuration(format!("Invalid overlay config: {}", e)))?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(IntervalClock::from_refresh_rate(self.config.refresh_rate_hz)));
        let threshold = self
            .threshold
            .unwrap_or_else(|| ThresholdControl::new(self.config.confidence_threshold));
        let detector = match self.detector {
            Some(d) => DetectorSlot::Ready(DetectorAdapter::new(d)),
            None => DetectorSlot::Loading,
        };

        Ok(DetectionController {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    session: MediaSession::new(),
                    overlay: OverlayManager::new(self.surface),
                    state: ControllerState::Idle,
                    run: 0,
                    images_in_flight: 0,
                    consecutive_failures: 0,
                }),
                detector: RwLock::new(detector),
                loader: self.loader.unwrap_or_else(|| Arc::new(ImageLoader)),
                clock,
                status: self.status,
                threshold,
                config: self.config,
                video_task: Mutex::new(None),
            }),
        })
    }
}

/// Owns the media session, the overlay and the detection state machine.
/// Cheap to clone; clones drive the same pipeline.
#[derive(Clone)]
pub struct DetectionController {
    inner: Arc<Inner>,
}

impl DetectionController {
    pub fn builder(
        config: OverlayConfig,
        surface: Box<dyn OverlaySurface>,
        status: Arc<dyn StatusSink>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            config,
            surface,
            status,
            clock: None,
            loader: None,
            threshold: None,
            detector: None,
        }
    }

    /// Await a detector. Until it resolves, detection triggers are ignored;
    /// if it fails, they are refused for good.
    pub async fn load_detector<F>(&self, load: F) -> Result<()>
    where
        F: Future<Output = std::result::Result<Arc<dyn Detector>, DetectorError>> + Send,
    {
        self.post("Model is loading..");
        match load.await {
            Ok(detector) => {
                *self.inner.detector.write() = DetectorSlot::Ready(DetectorAdapter::new(detector));
                info!("Detector loaded");
                self.post("Model is loaded.");
                Ok(())
            }
            Err(e) => {
                error!("Detector failed to load: {}", e);
                *self.inner.detector.write() = DetectorSlot::Unavailable(e.to_string());
                self.post("Model failed to load.");
                Err(Error::DetectorUnavailable(e.to_string()))
            }
        }
    }

    /// Whether detection triggers should be enabled.
    pub fn detection_enabled(&self) -> bool {
        matches!(*self.inner.detector.read(), DetectorSlot::Ready(_))
    }

    pub fn state(&self) -> ControllerState {
        self.inner.shared.lock().state
    }

    pub fn generation(&self) -> Generation {
        self.inner.shared.lock().session.generation()
    }

    pub fn active_media(&self) -> Option<MediaHandle> {
        self.inner.shared.lock().session.active().cloned()
    }

    pub fn threshold(&self) -> &ThresholdControl {
        &self.inner.threshold
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.inner.config
    }

    /// Primitives currently drawn
    pub fn overlay(&self) -> Vec<OverlayPrimitive> {
        self.inner.shared.lock().overlay.primitives()
    }

    /// Decode raw media and make it the active item.
    ///
    /// A decode failure leaves the current media and overlay as they were.
    pub fn replace_media(&self, kind: MediaKind, name: &str, bytes: &[u8]) -> Result<MediaHandle> {
        let element = match self.inner.loader.load(kind, name, bytes) {
            Ok(element) => element,
            Err(e) => {
                warn!("Failed to load {}: {}", name, e);
                self.post(format!("Failed to load {}.", name));
                return Err(Error::MediaLoad(e.to_string()));
            }
        };
        Ok(self.replace_element(element))
    }

    /// Make an already-decoded element the active item. The previous item
    /// is released, the overlay cleared, and anything in flight goes stale.
    pub fn replace_element(&self, element: Arc<dyn MediaElement>) -> MediaHandle {
        let handle = {
            let mut shared = self.inner.shared.lock();
            let handle = shared.session.replace_with(element);
            shared.overlay.clear();
            shared.state = ControllerState::Idle;
            shared.run += 1;
            shared.images_in_flight = 0;
            shared.consecutive_failures = 0;
            handle
        };
        let noun = match handle.kind() {
            MediaKind::Image => "Image",
            MediaKind::Video => "Video",
        };
        self.post(format!("{} is added. {}", noun, handle.name()));
        handle
    }

    /// One-shot detection on the active still image.
    ///
    /// On failure the overlay keeps its last good contents, one status line
    /// is posted, and the error is returned for the caller's information.
    pub async fn detect_image(&self) -> Result<PassOutcome> {
        let Some(adapter) = self.adapter()? else {
            debug!("Detector still loading, ignoring detect trigger");
            return Ok(PassOutcome::Ignored);
        };

        let (ticket, media) = {
            let mut shared = self.inner.shared.lock();
            let (kind, ready) = match shared.session.active() {
                Some(active) => (active.kind(), active.is_ready()),
                None => return Ok(PassOutcome::Ignored),
            };
            if kind != MediaKind::Image {
                return Ok(PassOutcome::Ignored);
            }
            if !ready {
                debug!("Image not decoded yet, skipping detection");
                return Ok(PassOutcome::NotReady);
            }
            let Some(issued) = shared.session.issue() else {
                return Ok(PassOutcome::Ignored);
            };
            shared.state = ControllerState::DetectingImage;
            shared.images_in_flight += 1;
            issued
        };
        let pass = ImagePass {
            controller: self,
            ticket,
        };

        self.post("Detecting image...");
        let result = adapter
            .detect(ticket, &media)
            .await
            .map(|batch| self.apply(&batch));
        drop(pass);

        match result {
            Ok(outcome) => {
                if let PassOutcome::Applied { detected, .. } = outcome {
                    self.post(format!("Detection complete! Found {} objects.", detected));
                }
                Ok(outcome)
            }
            Err(err) => {
                warn!("Image detection failed: {}", err);
                self.post("Detection failed.");
                Err(err)
            }
        }
    }

    /// React to a playback event from the active video.
    pub fn handle_playback(&self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Play => self.start_video("Video playing, detection started."),
            PlaybackEvent::Playing => self.start_video("Video is now playing, starting detection"),
            PlaybackEvent::Pause => self.stop_video("Video paused, detection stopped."),
            PlaybackEvent::Ended => self.stop_video("Video ended, detection stopped."),
        }
    }

    /// Abort the video loop task, if any. In-flight results are discarded.
    pub async fn shutdown(&self) {
        {
            let mut shared = self.inner.shared.lock();
            shared.run += 1;
            shared.session.discard_in_flight();
            if shared.state == ControllerState::DetectingVideoFrame {
                shared.state = ControllerState::Stopped;
            }
        }
        let task = self.inner.video_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    /// Wait for the current video loop to finish on its own.
    pub async fn join_video(&self) {
        let task = self.inner.video_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn adapter(&self) -> Result<Option<DetectorAdapter>> {
        match &*self.inner.detector.read() {
            DetectorSlot::Ready(adapter) => Ok(Some(adapter.clone())),
            DetectorSlot::Loading => Ok(None),
            DetectorSlot::Unavailable(reason) => Err(Error::DetectorUnavailable(reason.clone())),
        }
    }

    /// Replace the overlay with `batch` if it is still current.
    fn apply(&self, batch: &DetectionBatch) -> PassOutcome {
        let threshold = self.inner.threshold.get();
        let outcome = {
            let mut guard = self.inner.shared.lock();
            let shared = &mut *guard;
            if !shared.session.accepts(&batch.ticket) {
                debug!(
                    "Discarding stale batch #{} ({})",
                    batch.ticket.sequence, batch.ticket.generation
                );
                return PassOutcome::Discarded;
            }
            let Some(active) = shared.session.active() else {
                return PassOutcome::Discarded;
            };
            let scale = match ScaleFactors::for_media(
                active.kind(),
                active.native_size(),
                active.rendered_size(),
            ) {
                Ok(scale) => scale,
                Err(e) => {
                    debug!("Skipping render: {}", e);
                    return PassOutcome::NotReady;
                }
            };
            shared.session.mark_applied(&batch.ticket);
            shared.overlay.clear();
            let rendered = shared.overlay.render(
                &batch.detections,
                scale,
                threshold,
                self.inner.config.label_offset,
            );
            PassOutcome::Applied {
                detected: batch.len(),
                rendered,
            }
        };
        self.inner.status.explain(batch);
        outcome
    }

    fn finish_image(&self, ticket: &PassTicket) {
        let mut shared = self.inner.shared.lock();
        if ticket.generation != shared.session.generation() {
            return;
        }
        shared.images_in_flight = shared.images_in_flight.saturating_sub(1);
        if shared.images_in_flight == 0 && shared.state == ControllerState::DetectingImage {
            shared.state = ControllerState::Idle;
        }
    }

    fn start_video(&self, message: &str) {
        let adapter = match self.adapter() {
            Ok(Some(adapter)) => adapter,
            Ok(None) => {
                debug!("Detector still loading, not starting video detection");
                return;
            }
            Err(e) => {
                warn!("Not starting video detection: {}", e);
                return;
            }
        };

        let run = {
            let mut shared = self.inner.shared.lock();
            match shared.session.active() {
                Some(active) if active.kind() == MediaKind::Video => {}
                _ => return,
            }
            if shared.state == ControllerState::DetectingVideoFrame {
                debug!("Video loop already running");
                return;
            }
            shared.state = ControllerState::DetectingVideoFrame;
            shared.run += 1;
            shared.consecutive_failures = 0;
            shared.run
        };

        self.post(message);
        let controller = self.clone();
        let task = tokio::spawn(async move { controller.video_loop(adapter, run).await });
        *self.inner.video_task.lock() = Some(task);
    }

    fn stop_video(&self, message: &str) {
        {
            let mut shared = self.inner.shared.lock();
            match shared.session.active() {
                Some(active) if active.kind() == MediaKind::Video => {}
                _ => return,
            }
            shared.run += 1;
            shared.session.discard_in_flight();
            shared.state = ControllerState::Stopped;
        }
        self.post(message);
    }

    /// True while `run` is the live loop and the video is still playing.
    /// Moves the controller to `Stopped` when playback has halted.
    fn keep_running(&self, run: u64) -> bool {
        let mut shared = self.inner.shared.lock();
        if shared.run != run {
            return false;
        }
        let playing = shared
            .session
            .active()
            .map(|active| active.is_playing())
            .unwrap_or(false);
        if !playing {
            debug!("Video no longer playing, stopping loop");
            shared.state = ControllerState::Stopped;
        }
        playing
    }

    async fn video_loop(self, adapter: DetectorAdapter, run: u64) {
        debug!("Video loop {} started", run);
        while self.keep_running(run) {
            let issued = {
                let mut shared = self.inner.shared.lock();
                let ready = shared
                    .session
                    .active()
                    .map(|active| active.is_ready())
                    .unwrap_or(false);
                if ready {
                    shared.session.issue()
                } else {
                    None
                }
            };

            if let Some((ticket, media)) = issued {
                match adapter.detect(ticket, &media).await {
                    Ok(batch) => {
                        if let PassOutcome::Applied { detected, .. } = self.apply(&batch) {
                            self.reset_failures(run);
                            self.post(format!("Detected video frame. Found {} objects.", detected));
                        }
                    }
                    Err(e) => self.report_frame_failure(run, &e),
                }

                if !self.keep_running(run) {
                    break;
                }
            }

            self.inner.clock.next_frame().await;
        }
        debug!("Video loop {} finished", run);
    }

    fn reset_failures(&self, run: u64) {
        let mut shared = self.inner.shared.lock();
        if shared.run == run {
            shared.consecutive_failures = 0;
        }
    }

    fn report_frame_failure(&self, run: u64, err: &Error) {
        let streak = {
            let mut shared = self.inner.shared.lock();
            if shared.run != run {
                None
            } else {
                shared.consecutive_failures += 1;
                Some(shared.consecutive_failures)
            }
        };
        let Some(streak) = streak else {
            debug!("Dropping failure from a stopped video loop: {}", err);
            return;
        };

        let every = self.inner.config.failure_report_after;
        if streak % every == 0 {
            error!("Video detection failed {} times in a row: {}", streak, err);
            self.post(format!("Detection failed {} times in a row: {}", streak, err));
        } else {
            warn!("Video detection failed: {}", err);
            self.post("Detection failed.");
        }
    }

    fn post(&self, text: impl Into<String>) {
        self.inner.status.post(StatusMessage::now(text));
    }
}

/// Balances the in-flight count of one image pass, even if the pass is
/// dropped while the detector call is pending.
struct ImagePass<'a> {
    controller: &'a DetectionController,
    ticket: PassTicket,
}

impl Drop for ImagePass<'_> {
    fn drop(&mut self) {
        self.controller.finish_image(&self.ticket);
    }
}

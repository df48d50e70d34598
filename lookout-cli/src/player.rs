// Frame-directory playback standing in for a decoded video

use anyhow::{bail, Context};
use lookout_core::{MediaKind, Size};
use lookout_eye::{DetectionController, MediaElement, PlaybackEvent, PlaybackState};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// A sorted directory of still frames played back at a fixed rate
pub struct FrameSequence {
    name: String,
    frames: Vec<PathBuf>,
    native: Size,
    rendered: Size,
    position: AtomicU64,
    state: Mutex<PlaybackState>,
    released: AtomicBool,
}

impl FrameSequence {
    /// Index the frames in `dir`. The first frame fixes the native size;
    /// `display` overrides the rendered size, which otherwise matches it.
    pub fn open(dir: &Path, display: Option<Size>) -> anyhow::Result<Self> {
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame {
                frames.push(path);
            }
        }
        frames.sort();

        let Some(first) = frames.first() else {
            bail!("no frames found in {}", dir.display());
        };
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("reading dimensions of {}", first.display()))?;
        let native = Size::new(width, height);

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        Ok(Self {
            name,
            frames,
            native,
            rendered: display.unwrap_or(native),
            position: AtomicU64::new(0),
            state: Mutex::new(PlaybackState::Paused),
            released: AtomicBool::new(false),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_path(&self, index: u64) -> Option<&Path> {
        self.frames.get(index as usize).map(PathBuf::as_path)
    }

    pub fn current(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    pub fn set_state(&self, state: PlaybackState) {
        *self.state.lock() = state;
    }

    /// Step to the next frame. Returns false at the last frame.
    pub fn advance(&self) -> bool {
        let next = self.current() + 1;
        if next as usize >= self.frames.len() {
            return false;
        }
        self.position.store(next, Ordering::SeqCst);
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl MediaElement for FrameSequence {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn native_size(&self) -> Size {
        self.native
    }

    fn rendered_size(&self) -> Size {
        self.rendered
    }

    fn playback(&self) -> PlaybackState {
        *self.state.lock()
    }

    fn position(&self) -> Option<u64> {
        Some(self.current())
    }

    fn release(&self) {
        debug!("Releasing frame sequence {}", self.name);
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Play `sequence` start to end at `fps`, firing the playback events a
/// video element would. `on_frame` runs once per displayed frame, after
/// the overlay has had a chance to catch up with it.
pub async fn play<F>(
    controller: &DetectionController,
    sequence: &Arc<FrameSequence>,
    fps: u32,
    mut on_frame: F,
) -> anyhow::Result<()>
where
    F: FnMut(u64) -> anyhow::Result<()>,
{
    let mut ticker = time::interval(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    sequence.set_state(PlaybackState::Playing);
    controller.handle_playback(PlaybackEvent::Play);
    controller.handle_playback(PlaybackEvent::Playing);

    // first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        on_frame(sequence.current())?;
        if !sequence.advance() {
            break;
        }
    }

    sequence.set_state(PlaybackState::Ended);
    controller.handle_playback(PlaybackEvent::Ended);
    controller.join_video().await;
    Ok(())
}

//! Frame pacing for the video loop.
//!
//! The loop waits for the next displayable frame between passes instead of
//! detecting on a fixed timer, so it never runs faster than frames change.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Source of "next frame is about to be shown" signals
#[async_trait]
pub trait FrameClock: Send + Sync {
    async fn next_frame(&self);
}

/// Display-refresh stand-in: ticks at a fixed refresh rate, skipping ticks
/// missed while a slow pass was in flight. The timer starts on first use.
pub struct IntervalClock {
    period: Duration,
    interval: Mutex<Option<Interval>>,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: Mutex::new(None),
        }
    }

    pub fn from_refresh_rate(hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz.max(1) as f64))
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn next_frame(&self) {
        let mut slot = self.interval.lock().await;
        let interval = slot.get_or_insert_with(|| {
            let mut interval = time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
    }
}

/// Yields to the scheduler once per frame. Useful where there is no display.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldClock;

#[async_trait]
impl FrameClock for YieldClock {
    async fn next_frame(&self) {
        tokio::task::yield_now().await;
    }
}

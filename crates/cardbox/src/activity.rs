//! State shared between the tag-reader thread and the UI loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Timestamp of the last qualifying activity (touch, card, playing tick).
///
/// Stored as milliseconds since construction and only ever moved forward,
/// so a late writer holding an older reading cannot rewind it.
pub struct ActivityClock {
    origin: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, at: Instant) {
        let ms = at.saturating_duration_since(self.origin).as_millis() as u64;
        self.last_ms.fetch_max(ms, Ordering::AcqRel);
    }

    pub fn last(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Acquire))
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last())
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SharedState {
    pub activity: ActivityClock,
    showing_splash: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            activity: ActivityClock::new(),
            // the scene boots into the splash image
            showing_splash: AtomicBool::new(true),
        }
    }

    pub fn showing_splash(&self) -> bool {
        self.showing_splash.load(Ordering::Acquire)
    }

    pub fn set_showing_splash(&self, showing: bool) {
        self.showing_splash.store(showing, Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

//! Millisecond clock sources and the session time origin

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Millis;

/// A free-running millisecond counter that wraps at `u32::MAX`.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Wall clock based on [`std::time::Instant`], truncated to the wrapping `u32` width.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: std::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

/// Clock driven by tokio's time source, so paused-time tests control it.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { start: tokio::time::Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

/// Hand-driven clock. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self { now: Arc::new(AtomicU32::new(start)) }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Advance by `ms`, wrapping at `u32::MAX` like the hardware counter.
    pub fn advance(&self, ms: Millis) {
        let now = self.now.load(Ordering::Relaxed);
        self.now.store(now.wrapping_add(ms), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::Relaxed)
    }
}

/// Time origin and active flag of an acquisition session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionClock {
    origin: Millis,
    active: bool,
}

impl SessionClock {
    /// Capture `now` as the origin and mark the session active.
    pub fn start(&mut self, now: Millis) {
        self.origin = now;
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn origin(&self) -> Millis {
        self.origin
    }

    /// Milliseconds since the origin. Only meaningful while active.
    pub fn relative(&self, now: Millis) -> Millis {
        now.wrapping_sub(self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time_reached;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now_ms(), 15);
        other.set(100);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn manual_clock_wraps() {
        let clock = ManualClock::new(u32::MAX - 1);
        clock.advance(3);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn session_relative_time_survives_wraparound() {
        let mut session = SessionClock::default();
        assert!(!session.is_active());

        session.start(u32::MAX - 49);
        assert!(session.is_active());
        assert_eq!(session.relative(u32::MAX - 49), 0);
        assert_eq!(session.relative(50), 100);

        session.stop();
        assert!(!session.is_active());
    }

    #[test]
    fn monotonic_clock_starts_near_zero() {
        let clock = MonotonicClock::new();
        let first = clock.now_ms();
        assert!(first < 1_000);
        assert!(time_reached(clock.now_ms(), first));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        tokio::time::advance(std::time::Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), 250);
    }
}

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Time stamps handed to every stage of a frame, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTime {
    /// Monotonic time since the show started.
    pub now: f64,
    /// Wall-clock epoch time corrected by the sync offset.
    pub synced: f64,
}

/// External source of reference time, e.g. a time server.
pub trait TimeSource {
    /// Returns the reference epoch time in milliseconds.
    fn reference_ms(&self) -> Result<f64>;
}

/// Frame clock combining a monotonic start instant with a wall-clock offset.
#[derive(Debug, Clone)]
pub struct ShowClock {
    started: Instant,
    offset_ms: f64,
}

impl Default for ShowClock {
    fn default() -> Self {
        Self::start()
    }
}

impl ShowClock {
    /// Starts a clock with no wall-clock correction.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            offset_ms: 0.0,
        }
    }

    pub fn with_offset(offset_ms: f64) -> Self {
        Self {
            offset_ms: if offset_ms.is_finite() { offset_ms } else { 0.0 },
            ..Self::start()
        }
    }

    /// Measures the offset against `source`, compensating half the round
    /// trip. Any failure leaves the offset at zero; the show then runs on
    /// local time.
    pub fn synchronise(&mut self, source: &dyn TimeSource) -> f64 {
        let sent = epoch_ms();
        self.offset_ms = match source.reference_ms() {
            Ok(reference) if reference.is_finite() => {
                let received = epoch_ms();
                let round_trip = received - sent;
                reference - received + round_trip / 2.0
            }
            Ok(_) => {
                tracing::warn!("time source returned a non-finite time, using local clock");
                0.0
            }
            Err(err) => {
                tracing::warn!(%err, "time sync failed, using local clock");
                0.0
            }
        };
        tracing::info!(offset_ms = self.offset_ms, "clock synchronised");
        self.offset_ms
    }

    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    /// Reads both time bases for the current frame.
    pub fn frame_time(&self) -> FrameTime {
        FrameTime {
            now: self.started.elapsed().as_secs_f64() * 1000.0,
            synced: epoch_ms() + self.offset_ms,
        }
    }
}

fn epoch_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Fixed-rate frame pacing for loops without a display refresh callback.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    frame_ms: f64,
    next_due: f64,
    frames: u64,
}

impl FrameScheduler {
    pub fn new(fps: u32) -> Self {
        Self {
            frame_ms: 1000.0 / f64::from(fps.max(1)),
            next_due: 0.0,
            frames: 0,
        }
    }

    pub fn frame_ms(&self) -> f64 {
        self.frame_ms
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Milliseconds to wait before the next frame is due. When the loop has
    /// fallen behind it skips ahead instead of bursting frames.
    pub fn wait_ms(&mut self, now: f64) -> f64 {
        if now - self.next_due > self.frame_ms * 4.0 {
            self.next_due = now;
        }
        let wait = (self.next_due - now).max(0.0);
        self.next_due += self.frame_ms;
        self.frames += 1;
        wait
    }
}

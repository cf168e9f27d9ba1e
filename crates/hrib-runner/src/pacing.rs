//! Request pacing for third-party services.
//!
//! Each remote service gets its own [`Throttle`]. A throttle guarantees a
//! minimum spacing between the *start* of consecutive requests, no matter
//! how many worker threads share it, which keeps the aggregate request rate
//! at or below one request per interval.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Minimum-interval gate shared by every caller of one service.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Throttle allowing one request per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Throttle that never waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Configured spacing.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the caller may start a request.
    ///
    /// Slots are handed out in call order; the lock is released before
    /// sleeping so later callers can reserve the following slots.
    pub fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }

        let start = {
            let mut next_slot = self.next_slot.lock();
            let now = Instant::now();
            let start = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(start + self.interval);
            start
        };

        let now = Instant::now();
        if start > now {
            std::thread::sleep(start - now);
        }
    }
}

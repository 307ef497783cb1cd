//! Reconnect pacing.
//!
//! Both the node links and the relay socket retry forever; this keeps the
//! retry rate bounded without giving up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity at which a backoff wait notices shutdown
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Capped exponential backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt, doubling up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sleep for the next delay, in short slices.
    ///
    /// Returns false as soon as `running` is cleared.
    pub fn wait(&mut self, running: &AtomicBool) -> bool {
        let deadline = Instant::now() + self.next_delay();
        loop {
            if !running.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}

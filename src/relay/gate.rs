//! Gesture-triggered admission of motion samples
//!
//! The motion node streams continuously; downstream only wants one bounded
//! burst per deliberate gesture. A sample whose acceleration magnitude exceeds
//! the threshold opens a window of `window_size` samples (the trigger sample
//! included). Samples outside a window are dropped. A new trigger cannot start
//! until the current window has drained.
//!
//! Shot devices bypass the gate entirely.

use crate::core::types::SensorRecord;

/// Default magnitude threshold, in accelerometer units
pub const DEFAULT_MAGNITUDE_THRESHOLD: f32 = 1.5;

/// Default number of motion samples forwarded per trigger
pub const DEFAULT_WINDOW_SIZE: u32 = 60;

/// Per-player admission state
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    threshold: f32,
    window_size: u32,
    triggered: bool,
    remaining: u32,
}

impl AdmissionGate {
    pub fn new(threshold: f32, window_size: u32) -> Self {
        debug_assert!(window_size > 0, "zero-length admission window");
        Self {
            threshold,
            window_size,
            triggered: false,
            remaining: 0,
        }
    }

    /// Decide whether a reading is forwarded
    pub fn admit(&mut self, record: &SensorRecord) -> bool {
        if record.role.is_shot_device() {
            return true;
        }

        if !self.triggered && record.accel_magnitude() > self.threshold {
            self.triggered = true;
            self.remaining = self.window_size;
            log::debug!(
                "{} gate triggered (|a| = {:.2}), forwarding {} samples",
                record.player,
                record.accel_magnitude(),
                self.window_size
            );
        }

        if self.triggered && self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.triggered = false;
            }
            return true;
        }

        false
    }

    /// Back to idle: no window open
    pub fn reset(&mut self) {
        self.triggered = false;
        self.remaining = 0;
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Samples still to forward in the open window
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAGNITUDE_THRESHOLD, DEFAULT_WINDOW_SIZE)
    }
}

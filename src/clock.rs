// SPDX-License-Identifier: GPL-3.0-only

//! Frame rate measurement over fixed windows

use crate::constants::timing::RATE_WINDOW;
use std::time::{Duration, Instant};

/// Counts ticks and derives frames per second once per measurement window
#[derive(Debug, Clone)]
pub struct FrameClock {
    frame_count: u32,
    window_start: Instant,
    rate: u32,
    window: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            frame_count: 0,
            window_start: Instant::now(),
            rate: 0,
            window,
        }
    }

    /// Record one frame and return the current rate
    pub fn tick(&mut self) -> u32 {
        self.tick_at(Instant::now())
    }

    /// Record one frame at `now`.
    ///
    /// Once at least one window has elapsed the rate becomes
    /// `round(count * 1000 / elapsed_ms)` and the window restarts; before
    /// that the previous rate is returned unchanged.
    pub fn tick_at(&mut self, now: Instant) -> u32 {
        self.frame_count += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window {
            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            self.rate = (self.frame_count as f64 * 1000.0 / elapsed_ms).round() as u32;
            self.frame_count = 0;
            self.window_start = now;
        }

        self.rate
    }

    /// Last computed rate
    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.frame_count = 0;
        self.rate = 0;
        self.window_start = now;
    }
}

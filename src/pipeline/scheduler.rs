// SPDX-License-Identifier: GPL-3.0-only
//! Cooperative tick pacing
//!
//! Runs one tick per refresh interval on the calling thread. Each tick runs to
//! completion before the next is scheduled, and the stop signal is checked
//! before every tick so an in-flight tick always finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Action returned by the tick callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Schedule another tick
    Continue,
    /// Stop after this tick
    Stop,
}

/// Paces ticks at a fixed refresh rate
pub struct TickScheduler {
    interval: Duration,
    next_tick: Option<Instant>,
    stop_signal: Arc<AtomicBool>,
}

impl TickScheduler {
    /// Create a scheduler ticking `refresh_hz` times per second (at least 1)
    pub fn new(refresh_hz: u32) -> Self {
        let hz = refresh_hz.max(1);
        Self {
            interval: Duration::from_secs(1) / hz,
            next_tick: None,
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Get a clone of the stop signal for external use
    ///
    /// Setting it from another thread (e.g. a Ctrl-C handler) prevents the
    /// next tick from being scheduled.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop before its next tick
    pub fn request_stop(&self) {
        debug!("Requesting tick loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Clear a previous stop request so the scheduler can run again
    pub fn rearm(&mut self) {
        self.stop_signal.store(false, Ordering::SeqCst);
        self.next_tick = None;
    }

    /// Time left before the next tick is due (zero when overdue)
    pub fn time_until_next_tick(&self) -> Duration {
        self.next_tick
            .map(|due| due.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Mark a tick as started now if it is due.
    ///
    /// Returns false when the next tick is not due yet. Callers driving their
    /// own event loop (the terminal viewer) use this instead of blocking.
    pub fn try_begin_tick(&mut self) -> bool {
        let now = Instant::now();
        if self.next_tick.is_some_and(|due| now < due) {
            return false;
        }
        self.schedule_after(now);
        true
    }

    /// Sleep until the next tick is due, then mark it as started
    pub fn wait_for_next_tick(&mut self) {
        let wait = self.time_until_next_tick();
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        self.schedule_after(Instant::now());
    }

    fn schedule_after(&mut self, started: Instant) {
        // A late tick restarts the schedule from now instead of bursting
        let due = match self.next_tick {
            Some(prev) if started.duration_since(prev) < self.interval => prev + self.interval,
            _ => started + self.interval,
        };
        self.next_tick = Some(due);
    }

    /// Run `tick_fn` once per interval until it returns `LoopAction::Stop` or
    /// a stop is requested. Returns the number of ticks executed.
    pub fn run<F>(&mut self, mut tick_fn: F) -> u64
    where
        F: FnMut() -> LoopAction,
    {
        info!(interval_us = self.interval.as_micros() as u64, "Starting tick loop");
        let mut ticks = 0u64;

        loop {
            if self.is_stop_requested() {
                debug!("Stop signal received");
                break;
            }

            self.wait_for_next_tick();

            if self.is_stop_requested() {
                debug!("Stop signal received");
                break;
            }

            ticks += 1;
            match tick_fn() {
                LoopAction::Continue => {}
                LoopAction::Stop => {
                    debug!("Tick requested stop");
                    break;
                }
            }
        }

        info!(ticks, "Tick loop exiting");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_basic_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut scheduler = TickScheduler::new(1000);
        let ticks = scheduler.run(move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), 11); // 0-10 inclusive
        assert_eq!(ticks, 11);
    }

    #[test]
    fn test_stop_signal_from_other_thread() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut scheduler = TickScheduler::new(200);
        let signal = scheduler.stop_signal();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signal.store(true, Ordering::SeqCst);
        });

        scheduler.run(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            LoopAction::Continue
        });
        stopper.join().unwrap();

        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(scheduler.is_stop_requested());
    }

    #[test]
    fn test_stop_before_first_tick() {
        let mut scheduler = TickScheduler::new(60);
        scheduler.request_stop();
        let ticks = scheduler.run(|| LoopAction::Continue);
        assert_eq!(ticks, 0);

        scheduler.rearm();
        let ticks = scheduler.run(|| LoopAction::Stop);
        assert_eq!(ticks, 1);
    }

    #[test]
    fn test_ticks_are_paced() {
        let mut scheduler = TickScheduler::new(100);
        let start = Instant::now();
        let mut remaining = 5;
        scheduler.run(|| {
            remaining -= 1;
            if remaining == 0 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });
        // Four full intervals separate five ticks
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_try_begin_tick() {
        let mut scheduler = TickScheduler::new(1);
        assert!(scheduler.try_begin_tick());
        assert!(!scheduler.try_begin_tick());
        assert!(scheduler.time_until_next_tick() > Duration::from_millis(500));
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let scheduler = TickScheduler::new(0);
        assert_eq!(scheduler.interval(), Duration::from_secs(1));
        assert_eq!(scheduler.time_until_next_tick(), Duration::ZERO);
    }
}

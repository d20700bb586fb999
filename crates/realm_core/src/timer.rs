//! Accumulating update timers
//!
//! Timers advance by the simulated delta handed to each tick rather than by
//! polling the wall clock, so periodic work fires the same way regardless of
//! the tick rate.

use serde::{Deserialize, Serialize};

/// Countdown timer driven by tick deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTimer {
    /// Period in seconds
    duration: f64,
    /// Seconds left until the timer elapses
    remaining: f64,
    /// Disabled timers never elapse
    enabled: bool,
}

impl UpdateTimer {
    /// Create an enabled timer with the given period
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            remaining: duration,
            enabled: true,
        }
    }

    /// Create a timer that does not run until reset
    pub fn disabled(duration: f64) -> Self {
        Self {
            enabled: false,
            ..Self::new(duration)
        }
    }

    /// Advance by `delta` seconds. Overshoot past zero is kept.
    pub fn update(&mut self, delta: f64) {
        if self.enabled {
            self.remaining -= delta;
        }
    }

    /// Whether the period has fully elapsed
    pub fn has_elapsed(&self) -> bool {
        self.enabled && self.remaining <= 0.0
    }

    /// Consume every whole period that has elapsed and return how many.
    ///
    /// Time past the last consumed period carries into the next one, so a
    /// long frame fires as often as the same time split into short frames.
    pub fn take_elapsed(&mut self) -> u32 {
        if !self.has_elapsed() {
            return 0;
        }
        if self.duration <= 0.0 {
            self.remaining = self.duration;
            return 1;
        }
        let periods = (-self.remaining / self.duration).floor() as u32 + 1;
        self.remaining += f64::from(periods) * self.duration;
        periods
    }

    /// Restart the period and enable the timer
    pub fn reset(&mut self) {
        self.remaining = self.duration;
        self.enabled = true;
    }

    /// Restart the period and stop the timer
    pub fn reset_disabled(&mut self) {
        self.remaining = self.duration;
        self.enabled = false;
    }

    /// Period in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Seconds left in the current period
    pub fn remaining(&self) -> f64 {
        self.remaining.max(0.0)
    }

    /// Seconds elapsed in the current period
    pub fn elapsed(&self) -> f64 {
        (self.duration - self.remaining).clamp(0.0, self.duration)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

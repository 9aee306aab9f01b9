//! Decaying rate-of-change meter
//!
//! A [`MetricRate`] hangs off a value slot. Mutations only record the latest
//! raw value; the registry's tick task periodically turns the difference since
//! the previous tick into a per-minute rate and folds it into an exponentially
//! weighted moving average, so the rate decays toward zero once updates stop.

use std::time::Duration;

/// Rates below this magnitude snap to zero
const RATE_FLOOR: f64 = 0.05;

/// Minimum movement that counts as a change worth reporting
const CHANGE_THRESHOLD: f64 = 0.01;

/// Exponentially weighted per-minute rate of a value slot
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRate {
    smoothing: f64,
    rate: f64,
    last_value: f64,
    value: f64,
    last_tick: Duration,
}

impl MetricRate {
    /// `smoothing` is the weight of the newest instantaneous rate, in `(0, 1]`
    pub fn new(smoothing: f64, now: Duration) -> Self {
        Self {
            smoothing,
            rate: 0.0,
            last_value: 0.0,
            value: 0.0,
            last_tick: now,
        }
    }

    /// Record the latest raw value without recomputing the rate
    pub fn update(&mut self, value: f64) {
        self.value = value;
    }

    /// Fold the change since the last tick into the rate
    ///
    /// Returns `true` when the rate moved enough to be worth reporting.
    pub fn tick(&mut self, now: Duration) -> bool {
        let elapsed = now.saturating_sub(self.last_tick).as_secs_f64();
        if elapsed <= 0.0 {
            return false;
        }
        self.last_tick = now;

        let diff = self.value - self.last_value;
        self.last_value = self.value;

        let per_minute = diff / elapsed * 60.0;
        let mut rate = self.rate + (per_minute - self.rate) * self.smoothing;
        if rate.abs() < RATE_FLOOR {
            rate = 0.0;
        }

        let changed = (rate - self.rate).abs() > CHANGE_THRESHOLD;
        self.rate = rate;
        changed
    }

    /// Current rate, per minute
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn reset(&mut self) {
        self.last_value = 0.0;
        self.value = 0.0;
        self.rate = 0.0;
    }
}

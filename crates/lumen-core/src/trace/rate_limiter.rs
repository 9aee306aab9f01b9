//! Token bucket rate limiter bounding the number of sampled traces

use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::error::{TelemetryError, TelemetryResult};

#[derive(Debug)]
struct BucketState {
    balance: f64,
    last_time: Duration,
}

/// Rate limiter using the token bucket algorithm
///
/// The bucket starts empty and holds at most `max(1, round(tps))` tokens, so
/// the first trace is admitted only after `1 / tps` seconds.
#[derive(Debug)]
pub struct RateLimiter {
    traces_per_second: f64,
    max_balance: f64,
    state: Mutex<BucketState>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(traces_per_second: f64, clock: SharedClock) -> TelemetryResult<Self> {
        if !(traces_per_second.is_finite() && traces_per_second > 0.0) {
            return Err(TelemetryError::config(format!(
                "traces_per_second must be a positive number, got {}",
                traces_per_second
            )));
        }

        let last_time = clock.now();
        Ok(Self {
            traces_per_second,
            max_balance: traces_per_second.round().max(1.0),
            state: Mutex::new(BucketState {
                balance: 0.0,
                last_time,
            }),
            clock,
        })
    }

    /// Spend one token if available
    pub fn check(&self) -> bool {
        self.check_cost(1.0)
    }

    /// Spend `cost` tokens if available
    ///
    /// Costs that are not positive finite numbers are never admitted.
    pub fn check_cost(&self, cost: f64) -> bool {
        if !(cost.is_finite() && cost > 0.0) {
            return false;
        }
        let mut state = self.refill();
        if state.balance >= cost {
            state.balance -= cost;
            true
        } else {
            false
        }
    }

    /// Current token balance after refilling
    pub fn balance(&self) -> f64 {
        self.refill().balance
    }

    pub fn max_balance(&self) -> f64 {
        self.max_balance
    }

    pub fn traces_per_second(&self) -> f64 {
        self.traces_per_second
    }

    /// Refill tokens based on elapsed time
    fn refill(&self) -> parking_lot::MutexGuard<'_, BucketState> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let elapsed = now.saturating_sub(state.last_time).as_secs_f64();
        state.last_time = now.max(state.last_time);
        state.balance = (state.balance + elapsed * self.traces_per_second).min(self.max_balance);
        state
    }
}

//! Time sources
//!
//! Every time-dependent component (rate limiter, quantile ring, rate meter,
//! timers, spans) reads time through a [`Clock`] so tests can drive virtual
//! time with [`ManualClock`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Wall-clock timestamp
    fn wall(&self) -> DateTime<Utc>;
}

/// Clock shared between a registry or tracer and everything it owns
pub type SharedClock = Arc<dyn Clock>;

/// Real time: `Instant` for monotonic readings, `Utc::now` for timestamps
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Shared handle to a fresh system clock
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a test can hand one clone to a registry and
/// keep another to advance it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    wall: DateTime<Utc>,
}

impl ManualClock {
    /// Start at zero elapsed time and the Unix epoch
    pub fn new() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }

    /// Start at zero elapsed time and the given wall time
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall,
            })),
        }
    }

    /// Move both monotonic and wall time forward
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.elapsed += by;
        state.wall += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    /// Convenience for `advance(Duration::from_millis(ms))`
    pub fn advance_millis(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Shared handle to this clock
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().elapsed
    }

    fn wall(&self) -> DateTime<Utc> {
        self.state.lock().wall
    }
}

/// Duration as fractional milliseconds
pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

//! Counter metrics - monotonically increasing values

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::gauge::GaugeState;
use super::labels::Labels;
use crate::error::{TelemetryError, TelemetryResult};

/// Gauge slots that only move up through `increment`
///
/// `set` is still allowed so collectors can mirror totals read from the OS.
#[derive(Debug)]
pub(crate) struct CounterState(GaugeState);

impl CounterState {
    pub(crate) fn new(initial_value: f64, rate_smoothing: Option<f64>) -> Self {
        Self(GaugeState::new(initial_value, rate_smoothing))
    }

    pub(crate) fn increment(
        &mut self,
        metric: &str,
        key: &str,
        labels: &Labels,
        delta: f64,
        timestamp: DateTime<Utc>,
        now: Duration,
    ) -> TelemetryResult<f64> {
        if delta < 0.0 {
            return Err(TelemetryError::invalid_value(
                metric,
                format!("counter cannot be increased by a negative amount ({})", delta),
            ));
        }
        Ok(self.0.add(key, labels, delta, timestamp, now))
    }
}

impl Deref for CounterState {
    type Target = GaugeState;

    fn deref(&self) -> &GaugeState {
        &self.0
    }
}

impl DerefMut for CounterState {
    fn deref_mut(&mut self) -> &mut GaugeState {
        &mut self.0
    }
}

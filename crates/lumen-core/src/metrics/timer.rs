//! Duration timers backed by a registry clock

use std::time::Duration;

use super::labels::Labels;
use super::registry::MetricRegistry;
use super::types::MetricKind;
use crate::clock::millis;
use crate::error::TelemetryResult;

/// Timer for measuring operation duration
///
/// Created by [`MetricRegistry::timer`]. Stopping records the elapsed
/// milliseconds into the target metric: observed on a histogram, set on a
/// gauge. Timers whose metric is missing or of another kind only report the
/// elapsed time.
#[derive(Debug)]
pub struct MetricTimer {
    registry: MetricRegistry,
    name: String,
    labels: Option<Labels>,
    start: Duration,
}

impl MetricTimer {
    pub(crate) fn new(registry: MetricRegistry, name: String, labels: Option<Labels>) -> Self {
        let start = registry.clock().now();
        Self {
            registry,
            name,
            labels,
            start,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get elapsed time without stopping
    pub fn elapsed(&self) -> Duration {
        self.registry.clock().now().saturating_sub(self.start)
    }

    /// Stop the timer, record the duration and return it in milliseconds
    pub fn stop(self) -> TelemetryResult<f64> {
        let elapsed = millis(self.elapsed());
        if let Some(metric) = self.registry.get_metric(&self.name) {
            match metric.kind() {
                MetricKind::Histogram => metric.observe(self.labels.as_ref(), elapsed, None)?,
                MetricKind::Gauge => metric.set(self.labels.as_ref(), elapsed, None)?,
                _ => {}
            }
        }
        Ok(elapsed)
    }
}

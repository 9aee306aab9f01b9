//! Histogram metrics - distributions of observed values
//!
//! Each label slot keeps a running count and sum, optional cumulative bucket
//! counters and an optional sliding quantile window.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::labels::Labels;
use super::quantiles::TimeWindowQuantiles;
use super::rate::MetricRate;
use super::types::{HistogramValue, SnapshotValue, ValueSnapshot};

/// Resolved quantile window parameters shared by every slot
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WindowSettings {
    pub quantiles: Vec<f64>,
    pub max_age: Duration,
    pub age_buckets: usize,
}

impl WindowSettings {
    fn reservoir(&self, now: Duration) -> TimeWindowQuantiles {
        TimeWindowQuantiles::new(&self.quantiles, self.max_age, self.age_buckets, now)
    }
}

#[derive(Debug)]
pub(crate) struct HistogramState {
    bounds: Option<Vec<f64>>,
    window: Option<WindowSettings>,
    rate_smoothing: Option<f64>,
    values: BTreeMap<String, HistogramRecord>,
}

#[derive(Debug)]
struct HistogramRecord {
    count: u64,
    sum: f64,
    last_value: f64,
    labels: Labels,
    timestamp: DateTime<Utc>,
    /// Cumulative counts, parallel to the metric's bounds
    bucket_values: Option<Vec<u64>>,
    quantile_values: Option<TimeWindowQuantiles>,
    rate: Option<MetricRate>,
}

impl HistogramRecord {
    fn reset(&mut self, window: Option<&WindowSettings>, timestamp: DateTime<Utc>, now: Duration) {
        self.count = 0;
        self.sum = 0.0;
        self.last_value = 0.0;
        self.timestamp = timestamp;
        if let Some(counts) = self.bucket_values.as_mut() {
            counts.iter_mut().for_each(|c| *c = 0);
        }
        self.quantile_values = window.map(|w| w.reservoir(now));
        if let Some(rate) = self.rate.as_mut() {
            rate.reset();
        }
    }

    fn snapshot(&mut self, key: &str, bounds: Option<&[f64]>, now: Duration) -> ValueSnapshot {
        let mut value = HistogramValue {
            count: self.count,
            sum: self.sum,
            last_value: self.last_value,
            rate: self.rate.as_ref().map(MetricRate::rate),
            ..Default::default()
        };

        if let (Some(bounds), Some(counts)) = (bounds, self.bucket_values.as_ref()) {
            value.buckets = Some(bounds.iter().copied().zip(counts.iter().copied()).collect());
        }

        if let Some(window) = self.quantile_values.as_mut() {
            let stats = window.snapshot(now);
            value.min = stats.min;
            value.mean = stats.mean;
            value.variance = stats.variance;
            value.std_dev = stats.std_dev;
            value.max = stats.max;
            value.quantiles = Some(stats.quantiles);
        }

        ValueSnapshot {
            key: key.to_string(),
            labels: self.labels.clone(),
            timestamp: self.timestamp,
            value: SnapshotValue::Histogram(value),
        }
    }

    fn summary(&self) -> Value {
        serde_json::json!({
            "count": self.count,
            "sum": self.sum,
            "last_value": self.last_value,
        })
    }
}

impl HistogramState {
    pub(crate) fn new(
        bounds: Option<Vec<f64>>,
        window: Option<WindowSettings>,
        rate_smoothing: Option<f64>,
    ) -> Self {
        Self {
            bounds,
            window,
            rate_smoothing,
            values: BTreeMap::new(),
        }
    }

    pub(crate) fn bounds(&self) -> Option<&[f64]> {
        self.bounds.as_deref()
    }

    pub(crate) fn window(&self) -> Option<&WindowSettings> {
        self.window.as_ref()
    }

    fn fresh_record(&self, labels: &Labels, timestamp: DateTime<Utc>, now: Duration) -> HistogramRecord {
        HistogramRecord {
            count: 0,
            sum: 0.0,
            last_value: 0.0,
            labels: labels.clone(),
            timestamp,
            bucket_values: self.bounds.as_ref().map(|b| vec![0; b.len()]),
            quantile_values: self.window.as_ref().map(|w| w.reservoir(now)),
            rate: self.rate_smoothing.map(|s| MetricRate::new(s, now)),
        }
    }

    /// Record one observation, returning the slot summary for change events
    pub(crate) fn observe(
        &mut self,
        key: &str,
        labels: &Labels,
        value: f64,
        timestamp: DateTime<Utc>,
        now: Duration,
    ) -> Value {
        if !self.values.contains_key(key) {
            let record = self.fresh_record(labels, timestamp, now);
            self.values.insert(key.to_string(), record);
        }
        let Some(record) = self.values.get_mut(key) else {
            return Value::Null;
        };

        record.count += 1;
        record.sum += value;
        record.last_value = value;
        record.timestamp = timestamp;

        if let (Some(bounds), Some(counts)) = (self.bounds.as_ref(), record.bucket_values.as_mut()) {
            for (bound, count) in bounds.iter().zip(counts.iter_mut()) {
                if value <= *bound {
                    *count += 1;
                }
            }
        }

        if let Some(window) = record.quantile_values.as_mut() {
            window.add(value, now);
        }

        if let Some(rate) = record.rate.as_mut() {
            rate.update(record.count as f64);
        }

        record.summary()
    }

    /// Zero one existing slot; unseen slots are left alone
    pub(crate) fn reset(&mut self, key: &str, timestamp: DateTime<Utc>, now: Duration) -> Option<Labels> {
        let record = self.values.get_mut(key)?;
        record.reset(self.window.as_ref(), timestamp, now);
        Some(record.labels.clone())
    }

    pub(crate) fn reset_all(&mut self, timestamp: DateTime<Utc>, now: Duration) -> Vec<Labels> {
        let window = self.window.as_ref();
        self.values
            .values_mut()
            .map(|record| {
                record.reset(window, timestamp, now);
                record.labels.clone()
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }

    /// Advance every quantile window; `true` when any of them rotated
    pub(crate) fn rotate(&mut self, now: Duration) -> bool {
        self.values
            .values_mut()
            .filter_map(|record| record.quantile_values.as_mut())
            .fold(false, |rotated, window| window.rotate(now) || rotated)
    }

    pub(crate) fn tick_rates(&mut self, now: Duration) -> Vec<(Value, Labels)> {
        self.values
            .values_mut()
            .filter_map(|record| {
                let rate = record.rate.as_mut()?;
                rate.tick(now)
                    .then(|| (record.summary(), record.labels.clone()))
            })
            .collect()
    }

    pub(crate) fn get(&mut self, key: &str, now: Duration) -> Option<ValueSnapshot> {
        let bounds = self.bounds.as_deref();
        self.values
            .get_mut(key)
            .map(|record| record.snapshot(key, bounds, now))
    }

    pub(crate) fn snapshot(&mut self, now: Duration) -> Vec<ValueSnapshot> {
        let bounds = self.bounds.as_deref();
        self.values
            .iter_mut()
            .map(|(key, record)| record.snapshot(key, bounds, now))
            .collect()
    }
}

//! Gauge metrics - values that can increase or decrease

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::labels::Labels;
use super::rate::MetricRate;
use super::types::{SnapshotValue, ValueSnapshot};

/// Value slots of a gauge, keyed by label hash
#[derive(Debug)]
pub(crate) struct GaugeState {
    initial_value: f64,
    /// `Some` when rate tracking is enabled
    rate_smoothing: Option<f64>,
    values: BTreeMap<String, GaugeRecord>,
}

#[derive(Debug)]
struct GaugeRecord {
    value: f64,
    labels: Labels,
    timestamp: DateTime<Utc>,
    rate: Option<MetricRate>,
}

impl GaugeRecord {
    fn snapshot(&self, key: &str) -> ValueSnapshot {
        ValueSnapshot {
            key: key.to_string(),
            labels: self.labels.clone(),
            timestamp: self.timestamp,
            value: SnapshotValue::Number {
                value: self.value,
                rate: self.rate.as_ref().map(MetricRate::rate),
            },
        }
    }
}

impl GaugeState {
    pub(crate) fn new(initial_value: f64, rate_smoothing: Option<f64>) -> Self {
        Self {
            initial_value,
            rate_smoothing,
            values: BTreeMap::new(),
        }
    }

    /// Current value of a slot; unseen slots read as the initial value
    pub(crate) fn current(&self, key: &str) -> f64 {
        self.values
            .get(key)
            .map(|r| r.value)
            .unwrap_or(self.initial_value)
    }

    /// Upsert a slot
    pub(crate) fn set(
        &mut self,
        key: &str,
        labels: &Labels,
        value: f64,
        timestamp: DateTime<Utc>,
        now: Duration,
    ) {
        let smoothing = self.rate_smoothing;
        let record = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| GaugeRecord {
                value,
                labels: labels.clone(),
                timestamp,
                rate: smoothing.map(|s| MetricRate::new(s, now)),
            });

        record.value = value;
        record.timestamp = timestamp;
        if let Some(rate) = record.rate.as_mut() {
            rate.update(value);
        }
    }

    /// `set(current + delta)`, returning the new value
    pub(crate) fn add(
        &mut self,
        key: &str,
        labels: &Labels,
        delta: f64,
        timestamp: DateTime<Utc>,
        now: Duration,
    ) -> f64 {
        let value = self.current(key) + delta;
        self.set(key, labels, value, timestamp, now);
        value
    }

    /// Put one slot back to the initial value
    pub(crate) fn reset(
        &mut self,
        key: &str,
        labels: &Labels,
        timestamp: DateTime<Utc>,
        now: Duration,
    ) -> f64 {
        self.set(key, labels, self.initial_value, timestamp, now);
        self.initial_value
    }

    /// Put every slot back to the initial value and restart its rate
    pub(crate) fn reset_all(&mut self, timestamp: DateTime<Utc>) -> Vec<(Value, Labels)> {
        let initial = self.initial_value;
        self.values
            .values_mut()
            .map(|record| {
                record.value = initial;
                record.timestamp = timestamp;
                if let Some(rate) = record.rate.as_mut() {
                    rate.reset();
                }
                (Value::from(initial), record.labels.clone())
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }

    /// Tick every slot's rate, returning the slots whose rate moved
    pub(crate) fn tick_rates(&mut self, now: Duration) -> Vec<(Value, Labels)> {
        self.values
            .values_mut()
            .filter_map(|record| {
                let rate = record.rate.as_mut()?;
                rate.tick(now)
                    .then(|| (Value::from(record.value), record.labels.clone()))
            })
            .collect()
    }

    pub(crate) fn get(&self, key: &str) -> Option<ValueSnapshot> {
        self.values.get(key).map(|record| record.snapshot(key))
    }

    pub(crate) fn snapshot(&self) -> Vec<ValueSnapshot> {
        self.values
            .iter()
            .map(|(key, record)| record.snapshot(key))
            .collect()
    }
}

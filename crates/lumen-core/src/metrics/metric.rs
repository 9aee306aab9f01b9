//! A registered metric and its kind-specific state
//!
//! Every mutation projects the caller's labels onto the metric's schema,
//! updates the slot under the metric's lock, marks the cached snapshot dirty
//! and, after the lock is released, pushes a [`MetricChange`] to the
//! registry's exporters.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use super::counter::CounterState;
use super::exporter::{ChangeNotifier, MetricChange};
use super::gauge::GaugeState;
use super::histogram::{HistogramState, WindowSettings};
use super::info::InfoState;
use super::labels::{Labels, hash_labels, project_labels};
use super::types::{
    Aggregator, MetricKind, MetricOptions, MetricSnapshot, QuantileOptions, ValueSnapshot,
};
use crate::clock::SharedClock;
use crate::config::MetricsConfig;
use crate::error::{TelemetryError, TelemetryResult};

/// Mutation handed to a metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricOp<'a> {
    Increment(f64),
    Decrement(f64),
    Set(&'a Value),
    Observe(f64),
}

impl MetricOp<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Increment(_) => "increment",
            Self::Decrement(_) => "decrement",
            Self::Set(_) => "set",
            Self::Observe(_) => "observe",
        }
    }
}

/// State of a user-defined metric kind
///
/// Implementations own their slots; the surrounding [`Metric`] takes care of
/// label projection, locking, snapshot caching and change notification.
pub trait CustomMetric: Send + fmt::Debug {
    /// Apply a mutation to the slot at `key`
    ///
    /// Returns the value to report to exporters, or `None` when the kind does
    /// not support the operation.
    fn apply(
        &mut self,
        op: MetricOp<'_>,
        key: &str,
        labels: &Labels,
        timestamp: DateTime<Utc>,
    ) -> Option<Value>;

    /// Reset one slot, returning the value to report if anything changed
    fn reset(&mut self, key: &str, labels: &Labels, timestamp: DateTime<Utc>) -> Option<Value>;

    fn reset_all(&mut self, timestamp: DateTime<Utc>) -> Vec<(Value, Labels)>;

    fn clear(&mut self);

    fn snapshot(&self) -> Vec<ValueSnapshot>;

    fn get(&self, key: &str) -> Option<ValueSnapshot> {
        self.snapshot().into_iter().find(|v| v.key == key)
    }
}

/// Builds the state of a custom metric kind at registration time
pub trait MetricFactory: Send + Sync {
    fn create(&self, options: &MetricOptions) -> TelemetryResult<Box<dyn CustomMetric>>;
}

impl<F> MetricFactory for F
where
    F: Fn(&MetricOptions) -> TelemetryResult<Box<dyn CustomMetric>> + Send + Sync,
{
    fn create(&self, options: &MetricOptions) -> TelemetryResult<Box<dyn CustomMetric>> {
        self(options)
    }
}

#[derive(Debug)]
enum KindState {
    Counter(CounterState),
    Gauge(GaugeState),
    Histogram(HistogramState),
    Info(InfoState),
    Custom(Box<dyn CustomMetric>),
}

#[derive(Debug)]
struct MetricState {
    store: KindState,
    dirty: bool,
    last_snapshot: Option<Vec<ValueSnapshot>>,
}

/// A registered metric
pub struct Metric {
    kind: MetricKind,
    name: String,
    description: Option<String>,
    label_names: Vec<String>,
    unit: Option<String>,
    aggregator: Aggregator,
    rate: bool,
    state: Mutex<MetricState>,
    notifier: ChangeNotifier,
    clock: SharedClock,
}

impl Metric {
    pub(crate) fn new(
        options: &MetricOptions,
        config: &MetricsConfig,
        custom: Option<Box<dyn CustomMetric>>,
        notifier: ChangeNotifier,
        clock: SharedClock,
    ) -> TelemetryResult<Self> {
        let rate_smoothing = options.rate.then_some(config.rate_smoothing);

        if !matches!(options.kind, MetricKind::Histogram)
            && (options.buckets.is_some() || options.quantiles.is_some())
        {
            return Err(TelemetryError::config(format!(
                "metric '{}': buckets and quantiles are only supported by histograms",
                options.name
            )));
        }
        if !options.initial_value.is_finite() {
            return Err(TelemetryError::config(format!(
                "metric '{}': initial value must be finite",
                options.name
            )));
        }

        let store = match (&options.kind, custom) {
            (MetricKind::Counter, _) => {
                KindState::Counter(CounterState::new(options.initial_value, rate_smoothing))
            }
            (MetricKind::Gauge, _) => {
                KindState::Gauge(GaugeState::new(options.initial_value, rate_smoothing))
            }
            (MetricKind::Histogram, _) => {
                let bounds = options
                    .buckets
                    .as_ref()
                    .map(|spec| spec.resolve(&config.default_buckets))
                    .transpose()?;
                let window = options
                    .quantiles
                    .as_ref()
                    .map(|q| window_settings(&options.name, q, config))
                    .transpose()?;
                KindState::Histogram(HistogramState::new(bounds, window, rate_smoothing))
            }
            (MetricKind::Info, _) => {
                if options.rate {
                    return Err(TelemetryError::config(format!(
                        "metric '{}': info metrics do not track rates",
                        options.name
                    )));
                }
                KindState::Info(InfoState::default())
            }
            (MetricKind::Custom(_), Some(custom)) => KindState::Custom(custom),
            (MetricKind::Custom(kind), None) => {
                return Err(TelemetryError::config(format!(
                    "unknown metric kind '{}'",
                    kind
                )));
            }
        };

        Ok(Self {
            kind: options.kind.clone(),
            name: options.name.clone(),
            description: options.description.clone(),
            label_names: options.label_names.clone(),
            unit: options.unit.clone(),
            aggregator: options.aggregator.unwrap_or(config.default_aggregator),
            rate: options.rate,
            state: Mutex::new(MetricState {
                store,
                dirty: true,
                last_snapshot: None,
            }),
            notifier,
            clock,
        })
    }

    pub fn kind(&self) -> &MetricKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    /// Whether value slots carry a rate meter
    pub fn has_rate(&self) -> bool {
        self.rate
    }

    /// Resolved histogram bucket bounds
    pub fn buckets(&self) -> Option<Vec<f64>> {
        match &self.state.lock().store {
            KindState::Histogram(h) => h.bounds().map(<[f64]>::to_vec),
            _ => None,
        }
    }

    /// Resolved histogram quantiles
    pub fn quantiles(&self) -> Option<Vec<f64>> {
        match &self.state.lock().store {
            KindState::Histogram(h) => h.window().map(|w| w.quantiles.clone()),
            _ => None,
        }
    }

    pub fn increment(
        self: &Arc<Self>,
        labels: Option<&Labels>,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        self.apply(MetricOp::Increment(value), labels, timestamp)
    }

    pub fn decrement(
        self: &Arc<Self>,
        labels: Option<&Labels>,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        self.apply(MetricOp::Decrement(value), labels, timestamp)
    }

    /// Set a slot; numeric kinds require a finite number
    pub fn set(
        self: &Arc<Self>,
        labels: Option<&Labels>,
        value: impl Into<Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        let value = value.into();
        self.apply(MetricOp::Set(&value), labels, timestamp)
    }

    pub fn observe(
        self: &Arc<Self>,
        labels: Option<&Labels>,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        self.apply(MetricOp::Observe(value), labels, timestamp)
    }

    fn apply(
        self: &Arc<Self>,
        op: MetricOp<'_>,
        labels: Option<&Labels>,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        if let MetricOp::Increment(v) | MetricOp::Decrement(v) | MetricOp::Observe(v) = op {
            self.finite(v)?;
        }
        let key = hash_labels(labels, &self.label_names);
        let labels = project_labels(labels, &self.label_names);
        let timestamp = timestamp.unwrap_or_else(|| self.clock.wall());
        let now = self.clock.now();

        let value = {
            let mut state = self.state.lock();
            let value = match (&mut state.store, op) {
                (KindState::Counter(c), MetricOp::Increment(delta)) => {
                    Value::from(c.increment(&self.name, &key, &labels, delta, timestamp, now)?)
                }
                (KindState::Counter(c), MetricOp::Set(v)) => {
                    let v = self.numeric(v)?;
                    c.set(&key, &labels, v, timestamp, now);
                    Value::from(v)
                }
                (KindState::Gauge(g), MetricOp::Increment(delta)) => {
                    Value::from(g.add(&key, &labels, delta, timestamp, now))
                }
                (KindState::Gauge(g), MetricOp::Decrement(delta)) => {
                    Value::from(g.add(&key, &labels, -delta, timestamp, now))
                }
                (KindState::Gauge(g), MetricOp::Set(v)) => {
                    let v = self.numeric(v)?;
                    g.set(&key, &labels, v, timestamp, now);
                    Value::from(v)
                }
                (KindState::Histogram(h), MetricOp::Observe(v)) => {
                    h.observe(&key, &labels, v, timestamp, now)
                }
                (KindState::Info(i), MetricOp::Set(v)) => {
                    i.set(&key, &labels, v.clone(), timestamp);
                    v.clone()
                }
                (KindState::Custom(c), op) => c
                    .apply(op, &key, &labels, timestamp)
                    .ok_or_else(|| self.unsupported(op.name()))?,
                (_, op) => return Err(self.unsupported(op.name())),
            };
            state.dirty = true;
            value
        };

        self.notify(value, labels, timestamp);
        Ok(())
    }

    /// Reset one slot to its kind's initial state
    pub fn reset(
        self: &Arc<Self>,
        labels: Option<&Labels>,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        let key = hash_labels(labels, &self.label_names);
        let labels = project_labels(labels, &self.label_names);
        let timestamp = timestamp.unwrap_or_else(|| self.clock.wall());
        let now = self.clock.now();

        let value = {
            let mut state = self.state.lock();
            let value = match &mut state.store {
                KindState::Counter(c) => Some(Value::from(c.reset(&key, &labels, timestamp, now))),
                KindState::Gauge(g) => Some(Value::from(g.reset(&key, &labels, timestamp, now))),
                KindState::Histogram(h) => h.reset(&key, timestamp, now).map(|_| Value::Null),
                KindState::Info(i) => {
                    i.reset(&key, &labels, timestamp);
                    Some(Value::Null)
                }
                KindState::Custom(c) => c.reset(&key, &labels, timestamp),
            };
            if value.is_some() {
                state.dirty = true;
            }
            value
        };

        if let Some(value) = value {
            self.notify(value, labels, timestamp);
        }
        Ok(())
    }

    /// Reset every slot
    pub fn reset_all(self: &Arc<Self>, timestamp: Option<DateTime<Utc>>) -> TelemetryResult<()> {
        let timestamp = timestamp.unwrap_or_else(|| self.clock.wall());
        let now = self.clock.now();

        let changes = {
            let mut state = self.state.lock();
            let changes = match &mut state.store {
                KindState::Counter(c) => c.reset_all(timestamp),
                KindState::Gauge(g) => g.reset_all(timestamp),
                KindState::Histogram(h) => h
                    .reset_all(timestamp, now)
                    .into_iter()
                    .map(|labels| (Value::Null, labels))
                    .collect(),
                KindState::Info(i) => i.reset_all(timestamp),
                KindState::Custom(c) => c.reset_all(timestamp),
            };
            state.dirty = true;
            changes
        };

        for (value, labels) in changes {
            self.notify(value, labels, timestamp);
        }
        Ok(())
    }

    /// Drop every value slot
    pub fn clear(&self) {
        let mut state = self.state.lock();
        match &mut state.store {
            KindState::Counter(c) => c.clear(),
            KindState::Gauge(g) => g.clear(),
            KindState::Histogram(h) => h.clear(),
            KindState::Info(i) => i.clear(),
            KindState::Custom(c) => c.clear(),
        }
        state.dirty = true;
    }

    /// Current value of the slot addressed by `labels`
    pub fn get(&self, labels: Option<&Labels>) -> Option<ValueSnapshot> {
        let key = hash_labels(labels, &self.label_names);
        let now = self.clock.now();
        let mut state = self.state.lock();
        match &mut state.store {
            KindState::Counter(c) => c.get(&key),
            KindState::Gauge(g) => g.get(&key),
            KindState::Histogram(h) => h.get(&key, now),
            KindState::Info(i) => i.get(&key),
            KindState::Custom(c) => c.get(&key),
        }
    }

    /// Snapshot of every slot, recomputed only when something changed
    pub fn snapshot(&self) -> MetricSnapshot {
        let now = self.clock.now();
        let values = {
            let mut state = self.state.lock();
            if let KindState::Histogram(h) = &mut state.store {
                if h.rotate(now) {
                    state.dirty = true;
                }
            }

            let cached = if state.dirty {
                None
            } else {
                state.last_snapshot.clone()
            };
            match cached {
                Some(values) => values,
                None => {
                    let values = match &mut state.store {
                        KindState::Counter(c) => c.snapshot(),
                        KindState::Gauge(g) => g.snapshot(),
                        KindState::Histogram(h) => h.snapshot(now),
                        KindState::Info(i) => i.snapshot(),
                        KindState::Custom(c) => c.snapshot(),
                    };
                    state.last_snapshot = Some(values.clone());
                    state.dirty = false;
                    values
                }
            }
        };

        MetricSnapshot {
            kind: self.kind.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            label_names: self.label_names.clone(),
            aggregator: self.aggregator,
            values,
        }
    }

    /// Tick every rate meter, notifying for the slots whose rate moved
    pub(crate) fn tick_rates(self: &Arc<Self>) {
        if !self.rate {
            return;
        }
        let now = self.clock.now();
        let changes = {
            let mut state = self.state.lock();
            let changes = match &mut state.store {
                KindState::Counter(c) => c.tick_rates(now),
                KindState::Gauge(g) => g.tick_rates(now),
                KindState::Histogram(h) => h.tick_rates(now),
                KindState::Info(_) | KindState::Custom(_) => Vec::new(),
            };
            if !changes.is_empty() {
                state.dirty = true;
            }
            changes
        };

        if changes.is_empty() {
            return;
        }
        let timestamp = self.clock.wall();
        for (value, labels) in changes {
            self.notify(value, labels, timestamp);
        }
    }

    fn notify(self: &Arc<Self>, value: Value, labels: Labels, timestamp: DateTime<Utc>) {
        self.notifier.notify(&MetricChange {
            metric: Arc::clone(self),
            value,
            labels,
            timestamp,
        });
    }

    fn unsupported(&self, operation: &'static str) -> TelemetryError {
        TelemetryError::type_mismatch(&self.name, &self.kind, operation)
    }

    fn finite(&self, value: f64) -> TelemetryResult<f64> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(TelemetryError::invalid_value(
                &self.name,
                format!("{} is not a finite number", value),
            ))
        }
    }

    fn numeric(&self, value: &Value) -> TelemetryResult<f64> {
        value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                TelemetryError::invalid_value(&self.name, format!("expected a number, got {}", value))
            })
    }

    /// Whether a re-registration with `options` describes this metric
    pub(crate) fn matches(&self, options: &MetricOptions) -> bool {
        self.kind == options.kind && self.label_names == options.label_names
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("label_names", &self.label_names)
            .field("aggregator", &self.aggregator)
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

fn window_settings(
    name: &str,
    options: &QuantileOptions,
    config: &MetricsConfig,
) -> TelemetryResult<WindowSettings> {
    let quantiles = options
        .quantiles
        .clone()
        .unwrap_or_else(|| config.default_quantiles.clone());
    if let Some(q) = quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        return Err(TelemetryError::config(format!(
            "metric '{}': quantile {} is outside [0, 1]",
            name, q
        )));
    }

    let max_age = options.max_age.unwrap_or(config.default_max_age);
    let age_buckets = options.age_buckets.unwrap_or(config.default_age_buckets);
    if max_age.is_zero() || age_buckets == 0 {
        return Err(TelemetryError::config(format!(
            "metric '{}': quantile window needs a non-zero max age and at least one age bucket",
            name
        )));
    }

    Ok(WindowSettings {
        quantiles,
        max_age,
        age_buckets,
    })
}

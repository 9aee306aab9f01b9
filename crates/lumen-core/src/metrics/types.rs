//! Metric kinds, registration options and snapshot types

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::labels::Labels;
use crate::error::{TelemetryError, TelemetryResult};

/// Metric kind
///
/// The four built-in kinds plus any kind added to a registry through
/// `MetricRegistry::define_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricKind {
    /// Monotonically increasing number
    Counter,
    /// Number that can go up and down
    Gauge,
    /// Distribution of observations
    Histogram,
    /// Arbitrary informational payload
    Info,
    /// User-defined kind resolved through the registry's factory table
    Custom(String),
}

impl MetricKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Info => "info",
            Self::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<&str> for MetricKind {
    fn from(name: &str) -> Self {
        match name {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "histogram" => Self::Histogram,
            "info" => Self::Info,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for MetricKind {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<MetricKind> for String {
    fn from(kind: MetricKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How exporters should combine the metric across sources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    #[default]
    Sum,
    Avg,
    Min,
    Max,
}

/// Histogram bucket layout
#[derive(Debug, Clone, PartialEq)]
pub enum BucketSpec {
    /// The registry's configured default bounds
    Default,
    /// Explicit bounds, sorted on registration
    Explicit(Vec<f64>),
    /// `count` bounds starting at `start`, `width` apart
    Linear { start: f64, width: f64, count: usize },
    /// `count` bounds starting at `start`, each `factor` times the previous
    Exponential { start: f64, factor: f64, count: usize },
}

impl BucketSpec {
    /// Resolve into sorted, de-duplicated bounds
    pub fn resolve(&self, defaults: &[f64]) -> TelemetryResult<Vec<f64>> {
        let mut bounds = match self {
            Self::Default => defaults.to_vec(),
            Self::Explicit(bounds) => bounds.clone(),
            Self::Linear {
                start,
                width,
                count,
            } => {
                if *count == 0 || !(*width > 0.0) {
                    return Err(TelemetryError::config(
                        "linear buckets need a positive width and count",
                    ));
                }
                linear_buckets(*start, *width, *count)
            }
            Self::Exponential {
                start,
                factor,
                count,
            } => {
                if *count == 0 || !(*start > 0.0) || !(*factor > 1.0) {
                    return Err(TelemetryError::config(
                        "exponential buckets need a positive start, a factor above 1 and a positive count",
                    ));
                }
                exponential_buckets(*start, *factor, *count)
            }
        };

        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(TelemetryError::config("bucket bounds must be finite"));
        }
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();
        Ok(bounds)
    }
}

/// `count` evenly spaced bounds
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + width * i as f64).collect()
}

/// `count` geometrically spaced bounds
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start * factor.powi(i as i32)).collect()
}

/// Quantile window settings; unset fields fall back to registry defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantileOptions {
    pub quantiles: Option<Vec<f64>>,
    pub max_age: Option<Duration>,
    pub age_buckets: Option<usize>,
}

impl QuantileOptions {
    pub fn new(quantiles: Vec<f64>) -> Self {
        Self {
            quantiles: Some(quantiles),
            ..Default::default()
        }
    }

    pub fn with_window(mut self, max_age: Duration, age_buckets: usize) -> Self {
        self.max_age = Some(max_age);
        self.age_buckets = Some(age_buckets);
        self
    }
}

/// Registration options for a metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricOptions {
    pub kind: MetricKind,
    pub name: String,
    pub description: Option<String>,
    /// Ordered label schema, fixed for the metric's lifetime
    pub label_names: Vec<String>,
    pub unit: Option<String>,
    /// Falls back to the registry default
    pub aggregator: Option<Aggregator>,
    /// Attach a rate meter to each value slot
    pub rate: bool,
    /// Value a counter or gauge slot resets to
    pub initial_value: f64,
    pub buckets: Option<BucketSpec>,
    pub quantiles: Option<QuantileOptions>,
}

impl MetricOptions {
    pub fn new(kind: impl Into<MetricKind>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            description: None,
            label_names: Vec::new(),
            unit: None,
            aggregator: None,
            rate: false,
            initial_value: 0.0,
            buckets: None,
            quantiles: None,
        }
    }

    pub fn counter(name: impl Into<String>) -> Self {
        Self::new(MetricKind::Counter, name)
    }

    pub fn gauge(name: impl Into<String>) -> Self {
        Self::new(MetricKind::Gauge, name)
    }

    pub fn histogram(name: impl Into<String>) -> Self {
        Self::new(MetricKind::Histogram, name)
    }

    pub fn info(name: impl Into<String>) -> Self {
        Self::new(MetricKind::Info, name)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_labels<I, S>(mut self, label_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_names = label_names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn with_rate(mut self, rate: bool) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_initial_value(mut self, value: f64) -> Self {
        self.initial_value = value;
        self
    }

    pub fn with_buckets(mut self, buckets: BucketSpec) -> Self {
        self.buckets = Some(buckets);
        self
    }

    pub fn with_default_buckets(self) -> Self {
        self.with_buckets(BucketSpec::Default)
    }

    pub fn with_quantiles(mut self, quantiles: QuantileOptions) -> Self {
        self.quantiles = Some(quantiles);
        self
    }

    pub fn with_default_quantiles(self) -> Self {
        self.with_quantiles(QuantileOptions::default())
    }
}

/// Point-in-time view of one metric, as returned by `MetricRegistry::list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub kind: MetricKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub label_names: Vec<String>,
    pub aggregator: Aggregator,
    pub values: Vec<ValueSnapshot>,
}

impl MetricSnapshot {
    /// Value of the slot whose key matches
    pub fn value(&self, key: &str) -> Option<&ValueSnapshot> {
        self.values.iter().find(|v| v.key == key)
    }
}

/// Point-in-time view of one label slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSnapshot {
    /// Label hash addressing the slot
    pub key: String,
    pub labels: Labels,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub value: SnapshotValue,
}

impl ValueSnapshot {
    /// Numeric value of a counter or gauge slot
    pub fn number(&self) -> Option<f64> {
        match &self.value {
            SnapshotValue::Number { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Rate attached to the slot, if rate tracking is enabled
    pub fn rate(&self) -> Option<f64> {
        match &self.value {
            SnapshotValue::Number { rate, .. } => *rate,
            SnapshotValue::Histogram(h) => h.rate,
            _ => None,
        }
    }

    pub fn histogram(&self) -> Option<&HistogramValue> {
        match &self.value {
            SnapshotValue::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn info(&self) -> Option<&Value> {
        match &self.value {
            SnapshotValue::Info { value } => Some(value),
            _ => None,
        }
    }
}

/// Kind-specific part of a value snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Number {
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        rate: Option<f64>,
    },
    Info {
        value: Value,
    },
    Histogram(HistogramValue),
    Custom {
        value: Value,
    },
}

/// Histogram slot statistics
///
/// `min` through `max` and `quantiles` come from the sliding quantile window
/// and are only present when quantiles are configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistogramValue {
    pub count: u64,
    pub sum: f64,
    pub last_value: f64,
    pub min: Option<f64>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub std_dev: Option<f64>,
    pub max: Option<f64>,
    /// `(upper bound, cumulative count)` in ascending bound order
    ///
    /// Serialized as a `{bound: count}` object.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_keyed"
    )]
    pub buckets: Option<Vec<(f64, u64)>>,
    /// `(quantile, value)` in ascending quantile order
    ///
    /// Serialized as a `{quantile: value}` object.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_keyed"
    )]
    pub quantiles: Option<Vec<(f64, Option<f64>)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

impl HistogramValue {
    /// Cumulative count for an exact bound
    pub fn bucket(&self, bound: f64) -> Option<u64> {
        self.buckets
            .as_ref()?
            .iter()
            .find(|(b, _)| *b == bound)
            .map(|(_, count)| *count)
    }

    /// Estimated value for an exact configured quantile
    pub fn quantile(&self, q: f64) -> Option<f64> {
        self.quantiles
            .as_ref()?
            .iter()
            .find(|(quantile, _)| *quantile == q)
            .and_then(|(_, value)| *value)
    }
}

/// Write ordered `(f64, value)` pairs as an object keyed by the number
fn serialize_keyed<S, V>(pairs: &Option<Vec<(f64, V)>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    match pairs {
        Some(pairs) => serializer.collect_map(pairs.iter().map(|(key, value)| (key.to_string(), value))),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_strings() {
        assert_eq!(MetricKind::from("histogram"), MetricKind::Histogram);
        assert_eq!(
            MetricKind::from("meter"),
            MetricKind::Custom("meter".to_string())
        );
        assert_eq!(MetricKind::Info.to_string(), "info");
        assert_eq!(
            serde_json::to_value(MetricKind::Counter).unwrap(),
            serde_json::json!("counter")
        );
    }

    #[test]
    fn test_linear_buckets() {
        assert_eq!(linear_buckets(1.0, 5.0, 4), vec![1.0, 6.0, 11.0, 16.0]);
    }

    #[test]
    fn test_exponential_buckets() {
        assert_eq!(exponential_buckets(1.0, 2.0, 5), vec![1.0, 2.0, 4.0, 8.0, 16.0]);
    }

    #[test]
    fn test_explicit_buckets_sorted_and_deduplicated() {
        let bounds = BucketSpec::Explicit(vec![10.0, 1.0, 5.0, 10.0])
            .resolve(&[])
            .unwrap();
        assert_eq!(bounds, vec![1.0, 5.0, 10.0]);
    }

    #[test]
    fn test_invalid_bucket_specs_rejected() {
        let linear = BucketSpec::Linear {
            start: 0.0,
            width: 0.0,
            count: 3,
        };
        assert!(linear.resolve(&[]).is_err());

        let exponential = BucketSpec::Exponential {
            start: 1.0,
            factor: 1.0,
            count: 3,
        };
        assert!(exponential.resolve(&[]).is_err());

        let explicit = BucketSpec::Explicit(vec![1.0, f64::NAN]);
        assert!(explicit.resolve(&[]).is_err());
    }

    #[test]
    fn test_default_buckets_come_from_registry() {
        let bounds = BucketSpec::Default.resolve(&[2.0, 1.0]).unwrap();
        assert_eq!(bounds, vec![1.0, 2.0]);
    }

    #[test]
    fn test_options_builder() {
        let opts = MetricOptions::histogram("latency")
            .with_description("Request latency")
            .with_labels(["route", "method"])
            .with_unit("millisecond")
            .with_default_buckets()
            .with_rate(true);
        assert_eq!(opts.kind, MetricKind::Histogram);
        assert_eq!(opts.label_names, vec!["route", "method"]);
        assert_eq!(opts.buckets, Some(BucketSpec::Default));
        assert!(opts.quantiles.is_none());
        assert!(opts.rate);
    }

    #[test]
    fn test_histogram_value_serializes_keyed_objects() {
        let value = HistogramValue {
            count: 3,
            sum: 12.5,
            last_value: 7.0,
            buckets: Some(vec![(0.5, 0), (10.0, 2), (25.0, 3)]),
            quantiles: Some(vec![(0.5, Some(4.0)), (0.99, None)]),
            ..Default::default()
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["buckets"], serde_json::json!({"0.5": 0, "10": 2, "25": 3}));
        assert_eq!(json["quantiles"], serde_json::json!({"0.5": 4.0, "0.99": null}));

        let bare = serde_json::to_value(HistogramValue::default()).unwrap();
        assert!(bare.get("buckets").is_none());
        assert!(bare.get("quantiles").is_none());
    }
}

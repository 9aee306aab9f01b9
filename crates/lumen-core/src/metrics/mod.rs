//! Metric registry and metric types
//!
//! This module provides:
//! - Counters: Monotonically increasing values
//! - Gauges: Values that can increase or decrease
//! - Histograms: Cumulative buckets and sliding-window quantiles
//! - Info: Arbitrary informational payloads
//! - Custom kinds defined at runtime through a factory table

mod counter;
mod exporter;
mod gauge;
mod histogram;
mod info;
mod labels;
mod metric;
mod quantiles;
mod rate;
mod registry;
mod timer;
mod types;

#[cfg(test)]
mod tests;

// Re-export all public items
pub use exporter::{MetricChange, MetricCollector, MetricExporter};
pub use labels::{LABEL_SEPARATOR, Labels, hash_labels, project_labels};
pub use metric::{CustomMetric, Metric, MetricFactory, MetricOp};
pub use quantiles::{QuantileSnapshot, TimeWindowQuantiles};
pub use rate::MetricRate;
pub use registry::{ListFilter, MetricRegistry};
pub use timer::MetricTimer;
pub use types::{
    Aggregator, BucketSpec, HistogramValue, MetricKind, MetricOptions, MetricSnapshot,
    QuantileOptions, SnapshotValue, ValueSnapshot, exponential_buckets, linear_buckets,
};

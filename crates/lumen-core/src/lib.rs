//! Lumen Core Library
//!
//! In-process telemetry for service runtimes: a metric registry with
//! counters, gauges, histograms and info metrics, and a tracer that samples
//! spans and hands them to exporters.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod trace;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{MetricsConfig, SamplingConfig, TelemetryConfig, TracerConfig};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogFormat, LoggingConfig, init_logging};
pub use metrics::{
    Aggregator, CustomMetric, Labels, ListFilter, Metric, MetricChange, MetricCollector,
    MetricExporter, MetricFactory, MetricKind, MetricOp, MetricOptions, MetricRegistry,
    MetricSnapshot, MetricTimer, SnapshotValue, ValueSnapshot,
};
pub use trace::{
    RateLimiter, Span, SpanContext, SpanError, SpanOptions, SpanState, Tags, TraceExporter, Tracer,
};

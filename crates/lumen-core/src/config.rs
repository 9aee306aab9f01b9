//! Telemetry configuration
//!
//! All sections deserialize from TOML with per-field defaults, so an empty
//! document yields a working configuration:
//!
//! ```toml
//! [metrics]
//! collect_interval = "10s"
//! default_quantiles = [0.5, 0.99]
//!
//! [tracing.sampling]
//! rate = 0.25
//! min_priority = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TelemetryError, TelemetryResult};
use crate::logging::LoggingConfig;
use crate::metrics::Aggregator;

/// Top-level configuration for a registry, a tracer and logging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub tracing: TracerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> TelemetryResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> TelemetryResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        self.metrics.validate()?;
        self.tracing.validate()
    }
}

/// Metric registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Disabled registries accept every call and record nothing
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Period of the collector task
    #[serde(default = "default_collect_interval", with = "humantime_serde")]
    pub collect_interval: Duration,

    /// Period of the rate-meter tick task
    #[serde(default = "default_rate_tick_interval", with = "humantime_serde")]
    pub rate_tick_interval: Duration,

    /// Weight of the newest sample in the rate meter's moving average
    #[serde(default = "default_rate_smoothing")]
    pub rate_smoothing: f64,

    /// Bucket bounds used when a histogram asks for default buckets
    #[serde(default = "default_buckets")]
    pub default_buckets: Vec<f64>,

    /// Quantiles used when a histogram asks for default quantiles
    #[serde(default = "default_quantiles")]
    pub default_quantiles: Vec<f64>,

    /// Sliding window covered by histogram quantiles
    #[serde(default = "default_max_age", with = "humantime_serde")]
    pub default_max_age: Duration,

    /// Number of ring buckets the quantile window is split into
    #[serde(default = "default_age_buckets")]
    pub default_age_buckets: usize,

    #[serde(default)]
    pub default_aggregator: Aggregator,
}

fn default_enabled() -> bool {
    true
}
fn default_collect_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_rate_tick_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_rate_smoothing() -> f64 {
    0.5
}
fn default_buckets() -> Vec<f64> {
    vec![
        0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
        10000.0,
    ]
}
fn default_quantiles() -> Vec<f64> {
    vec![0.5, 0.9, 0.95, 0.99, 0.999]
}
fn default_max_age() -> Duration {
    Duration::from_secs(60)
}
fn default_age_buckets() -> usize {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            collect_interval: default_collect_interval(),
            rate_tick_interval: default_rate_tick_interval(),
            rate_smoothing: default_rate_smoothing(),
            default_buckets: default_buckets(),
            default_quantiles: default_quantiles(),
            default_max_age: default_max_age(),
            default_age_buckets: default_age_buckets(),
            default_aggregator: Aggregator::default(),
        }
    }
}

impl MetricsConfig {
    /// Configuration for a registry that records nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_collect_interval(mut self, interval: Duration) -> Self {
        self.collect_interval = interval;
        self
    }

    pub fn with_rate_tick_interval(mut self, interval: Duration) -> Self {
        self.rate_tick_interval = interval;
        self
    }

    pub fn with_rate_smoothing(mut self, smoothing: f64) -> Self {
        self.rate_smoothing = smoothing;
        self
    }

    pub fn with_default_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.default_buckets = buckets;
        self
    }

    pub fn with_default_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.default_quantiles = quantiles;
        self
    }

    pub fn with_default_window(mut self, max_age: Duration, age_buckets: usize) -> Self {
        self.default_max_age = max_age;
        self.default_age_buckets = age_buckets;
        self
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.collect_interval.is_zero() || self.rate_tick_interval.is_zero() {
            return Err(TelemetryError::config(
                "metrics intervals must be greater than zero",
            ));
        }
        if !(self.rate_smoothing > 0.0 && self.rate_smoothing <= 1.0) {
            return Err(TelemetryError::config(format!(
                "rate_smoothing must be in (0, 1], got {}",
                self.rate_smoothing
            )));
        }
        if self.default_age_buckets == 0 || self.default_max_age.is_zero() {
            return Err(TelemetryError::config(
                "quantile window needs a non-zero max age and at least one age bucket",
            ));
        }
        if let Some(q) = self
            .default_quantiles
            .iter()
            .find(|q| !(0.0..=1.0).contains(*q))
        {
            return Err(TelemetryError::config(format!(
                "quantile {} is outside [0, 1]",
                q
            )));
        }
        if self.default_buckets.iter().any(|b| !b.is_finite()) {
            return Err(TelemetryError::config("bucket bounds must be finite"));
        }
        Ok(())
    }
}

/// Tracer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Disabled tracers still hand out spans but never sample them
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Tags merged into every span before its own tags
    #[serde(default)]
    pub default_tags: Map<String, Value>,

    /// Fields of a span error exposed to exporters
    #[serde(default = "default_error_fields")]
    pub error_fields: Vec<String>,
}

fn default_error_fields() -> Vec<String> {
    ["name", "message", "code", "kind", "data"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling: SamplingConfig::default(),
            default_tags: Map::new(),
            error_fields: default_error_fields(),
        }
    }
}

impl TracerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_default_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_error_fields(mut self, fields: Vec<String>) -> Self {
        self.error_fields = fields;
        self
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        self.sampling.validate()
    }
}

/// Sampling policy, evaluated in order: priority floor, rate limiter, rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Fraction of traces to sample, in `[0, 1]`
    #[serde(default = "default_sampling_rate")]
    pub rate: f64,

    /// Fixed trace budget; replaces `rate` when set
    #[serde(default)]
    pub traces_per_second: Option<f64>,

    /// Spans below this priority are never sampled
    #[serde(default)]
    pub min_priority: Option<u8>,
}

fn default_sampling_rate() -> f64 {
    1.0
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate: default_sampling_rate(),
            traces_per_second: None,
            min_priority: None,
        }
    }
}

impl SamplingConfig {
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_traces_per_second(mut self, tps: f64) -> Self {
        self.traces_per_second = Some(tps);
        self
    }

    pub fn with_min_priority(mut self, priority: u8) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if !(0.0..=1.0).contains(&self.rate) {
            return Err(TelemetryError::config(format!(
                "sampling rate must be in [0, 1], got {}",
                self.rate
            )));
        }
        if let Some(tps) = self.traces_per_second {
            if !(tps.is_finite() && tps > 0.0) {
                return Err(TelemetryError::config(format!(
                    "traces_per_second must be a positive number, got {}",
                    tps
                )));
            }
        }
        Ok(())
    }
}

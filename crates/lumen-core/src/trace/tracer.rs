//! Tracer - span factory and sampling authority

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use super::exporter::TraceExporter;
use super::rate_limiter::RateLimiter;
use super::span::{Span, SpanParts};
use super::types::{DEFAULT_PRIORITY, DEFAULT_SPAN_KIND, SpanError, SpanOptions, Tags, merge_tags};
use crate::clock::{SharedClock, SystemClock};
use crate::config::TracerConfig;
use crate::error::TelemetryResult;

struct TracerInner {
    config: TracerConfig,
    clock: SharedClock,
    rate_limiter: Option<RateLimiter>,
    sample_counter: Mutex<u64>,
    exporters: RwLock<Vec<Arc<dyn TraceExporter>>>,
}

/// Creates spans, decides sampling and forwards sampled spans to exporters
///
/// Cloning yields another handle to the same tracer. Spans are not retained.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Tracer {
    pub fn new(config: TracerConfig) -> TelemetryResult<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: TracerConfig, clock: SharedClock) -> TelemetryResult<Self> {
        config.validate()?;
        let rate_limiter = config
            .sampling
            .traces_per_second
            .map(|tps| RateLimiter::new(tps, Arc::clone(&clock)))
            .transpose()?;

        Ok(Self {
            inner: Arc::new(TracerInner {
                config,
                clock,
                rate_limiter,
                sample_counter: Mutex::new(0),
                exporters: RwLock::new(Vec::new()),
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    pub fn config(&self) -> &TracerConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    pub fn add_exporter(&self, exporter: Arc<dyn TraceExporter>) {
        self.inner.exporters.write().push(exporter);
    }

    fn exporters(&self) -> Vec<Arc<dyn TraceExporter>> {
        self.inner.exporters.read().clone()
    }

    /// Initialize every exporter
    pub fn init(&self) -> TelemetryResult<()> {
        for exporter in self.exporters() {
            exporter.init(self)?;
        }
        debug!(
            "Tracer initialized (enabled: {}, sampling: {:?})",
            self.is_enabled(),
            self.inner.config.sampling
        );
        Ok(())
    }

    /// Stop every exporter
    pub async fn stop(&self) {
        for exporter in self.exporters() {
            exporter.stop().await;
        }
        debug!("Tracer stopped");
    }

    /// Sampling decision for a root span
    ///
    /// Checked in order: priority floor, rate limiter, fixed rate. Fractional
    /// rates use a counter so a rate of 0.5 samples every second trace.
    pub fn should_sample(&self, span: &Span) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let sampling = &self.inner.config.sampling;
        if let Some(min_priority) = sampling.min_priority {
            if span.priority() < min_priority {
                return false;
            }
        }

        if let Some(limiter) = &self.inner.rate_limiter {
            return limiter.check();
        }

        if sampling.rate >= 1.0 {
            return true;
        }
        if sampling.rate <= 0.0 {
            return false;
        }

        let mut counter = self.inner.sample_counter.lock();
        *counter += 1;
        if *counter as f64 * sampling.rate >= 1.0 {
            *counter = 0;
            true
        } else {
            false
        }
    }

    /// Build a span without starting it
    pub fn create_span(&self, name: impl Into<String>, opts: SpanOptions) -> Span {
        let id = opts.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let (trace_id, parent_id, inherited) = match opts.parent {
            Some(parent) => (parent.trace_id, Some(parent.span_id), Some(parent.sampled)),
            None => (
                opts.trace_id.unwrap_or_else(|| id.clone()),
                opts.parent_id,
                opts.sampled,
            ),
        };

        let mut tags = self.inner.config.default_tags.clone();
        merge_tags(&mut tags, opts.tags);

        let mut span = Span::new(
            self.clone(),
            SpanParts {
                id,
                trace_id,
                parent_id,
                name: name.into(),
                kind: opts.kind.unwrap_or_else(|| DEFAULT_SPAN_KIND.to_string()),
                service: opts.service,
                priority: opts.priority.unwrap_or(DEFAULT_PRIORITY),
                tags,
            },
        );

        let sampled = self.is_enabled() && inherited.unwrap_or_else(|| self.should_sample(&span));
        span.set_sampled(sampled);
        span
    }

    /// Build and start a span
    pub fn start_span(&self, name: impl Into<String>, opts: SpanOptions) -> Span {
        let start_time = opts.start_time;
        let mut span = self.create_span(name, opts);
        span.begin(start_time);
        span
    }

    pub(crate) fn span_started(&self, span: &mut Span) {
        if !span.is_sampled() {
            return;
        }
        for exporter in self.exporters() {
            exporter.span_started(span);
        }
    }

    pub(crate) fn span_finished(&self, span: &mut Span) {
        if !span.is_sampled() {
            return;
        }
        trace!(
            "Span '{}' finished in {:?} ms (trace {})",
            span.name(),
            span.duration(),
            span.trace_id()
        );
        for exporter in self.exporters() {
            exporter.span_finished(span);
        }
    }

    /// Fields of `error` selected by the configured `error_fields`
    pub fn error_to_tags(&self, error: &SpanError) -> Tags {
        error.pick(&self.inner.config.error_fields)
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.inner.config.enabled)
            .field("sampling", &self.inner.config.sampling)
            .field("exporters", &self.inner.exporters.read().len())
            .finish()
    }
}

//! Span - one timed operation within a trace

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::tracer::Tracer;
use super::types::{SpanContext, SpanError, SpanLog, SpanOptions, SpanState, Tags, merge_tags};
use crate::clock::millis;
use crate::error::{TelemetryError, TelemetryResult};

/// Identity and attributes a tracer fixes when it creates a span
pub(crate) struct SpanParts {
    pub id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub kind: String,
    pub service: Option<String>,
    pub priority: u8,
    pub tags: Tags,
}

/// A timed operation
///
/// Created by [`Tracer::create_span`] or [`Tracer::start_span`]. The sampling
/// decision is taken once at creation and never changes; unsampled spans
/// still record everything but are never handed to exporters.
#[derive(Debug)]
pub struct Span {
    tracer: Tracer,
    id: String,
    trace_id: String,
    parent_id: Option<String>,
    name: String,
    kind: String,
    service: Option<String>,
    priority: u8,
    sampled: bool,
    state: SpanState,
    start_time: Option<DateTime<Utc>>,
    finish_time: Option<DateTime<Utc>>,
    start_ticks: Option<Duration>,
    duration: Option<f64>,
    error: Option<SpanError>,
    tags: Tags,
    logs: Vec<SpanLog>,
    /// Scratch space for exporters
    pub meta: HashMap<String, Value>,
}

impl Span {
    pub(crate) fn new(tracer: Tracer, parts: SpanParts) -> Self {
        Self {
            tracer,
            id: parts.id,
            trace_id: parts.trace_id,
            parent_id: parts.parent_id,
            name: parts.name,
            kind: parts.kind,
            service: parts.service,
            priority: parts.priority,
            sampled: false,
            state: SpanState::Created,
            start_time: None,
            finish_time: None,
            start_ticks: None,
            duration: None,
            error: None,
            tags: parts.tags,
            logs: Vec::new(),
            meta: HashMap::new(),
        }
    }

    pub(crate) fn set_sampled(&mut self, sampled: bool) {
        self.sampled = sampled;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    pub fn state(&self) -> SpanState {
        self.state
    }

    /// Started and not yet finished
    pub fn is_active(&self) -> bool {
        self.state == SpanState::Started
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        self.finish_time
    }

    /// Duration in milliseconds, once finished
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn error(&self) -> Option<&SpanError> {
        self.error.as_ref()
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn logs(&self) -> &[SpanLog] {
        &self.logs
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Identity handed to child spans
    pub fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.trace_id.clone(),
            span_id: self.id.clone(),
            sampled: self.sampled,
        }
    }

    /// Start the span
    ///
    /// Without an explicit `time` the start is taken from the tracer clock.
    pub fn start(&mut self, time: Option<DateTime<Utc>>) -> TelemetryResult<()> {
        if self.state != SpanState::Created {
            return Err(self.invalid_state("start"));
        }
        self.begin(time);
        Ok(())
    }

    pub(crate) fn begin(&mut self, time: Option<DateTime<Utc>>) {
        let clock = self.tracer.clock();
        self.start_ticks = Some(clock.now());
        self.start_time = Some(time.unwrap_or_else(|| clock.wall()));
        self.state = SpanState::Started;

        let tracer = self.tracer.clone();
        tracer.span_started(self);
    }

    /// Finish the span and compute its duration
    ///
    /// An explicit `time` measures the duration against the start timestamp;
    /// otherwise the tracer's monotonic clock is used.
    pub fn finish(&mut self, time: Option<DateTime<Utc>>) -> TelemetryResult<()> {
        if self.state != SpanState::Started {
            return Err(self.invalid_state("finish"));
        }

        let clock = self.tracer.clock();
        let (finish_time, duration) = match (time, self.start_time) {
            (Some(time), Some(start)) => (time, wall_millis(start, time)),
            (Some(time), None) => (time, 0.0),
            (None, _) => {
                let elapsed = self
                    .start_ticks
                    .map(|start| clock.now().saturating_sub(start))
                    .unwrap_or_default();
                (clock.wall(), millis(elapsed))
            }
        };
        self.finish_time = Some(finish_time);
        self.duration = Some(duration);
        self.state = SpanState::Finished;

        let tracer = self.tracer.clone();
        tracer.span_finished(self);
        Ok(())
    }

    /// Create and start a child span
    pub fn start_span(&self, name: impl Into<String>, opts: SpanOptions) -> Span {
        self.tracer.start_span(name, opts.child_of(self.context()))
    }

    /// Deep-merge tags into the span
    pub fn add_tags(&mut self, tags: Tags) -> &mut Self {
        merge_tags(&mut self.tags, tags);
        self
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Append a log entry
    ///
    /// `elapsed` is measured from the previous log, or from the span start.
    pub fn log(
        &mut self,
        name: impl Into<String>,
        fields: Option<Tags>,
        time: Option<DateTime<Utc>>,
    ) -> &mut Self {
        let time = time.unwrap_or_else(|| self.tracer.clock().wall());
        let elapsed = self
            .logs
            .last()
            .map(|log| log.time)
            .or(self.start_time)
            .map(|since| wall_millis(since, time))
            .unwrap_or(0.0);

        self.logs.push(SpanLog {
            name: name.into(),
            fields: fields.unwrap_or_default(),
            time,
            elapsed,
        });
        self
    }

    /// Attach an error; not allowed once the span finished
    pub fn set_error(&mut self, error: SpanError) -> TelemetryResult<()> {
        if self.state == SpanState::Finished {
            return Err(self.invalid_state("set an error on"));
        }
        self.error = Some(error);
        Ok(())
    }

    /// The error's configured fields, as tags for exporters
    pub fn error_tags(&self) -> Option<Tags> {
        self.error.as_ref().map(|e| self.tracer.error_to_tags(e))
    }

    /// JSON view of the span for exporters
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "trace_id": self.trace_id,
            "parent_id": self.parent_id,
            "name": self.name,
            "type": self.kind,
            "service": self.service,
            "priority": self.priority,
            "sampled": self.sampled,
            "start_time": self.start_time,
            "finish_time": self.finish_time,
            "duration": self.duration,
            "error": self.error_tags(),
            "tags": self.tags,
            "logs": self.logs,
        })
    }

    fn invalid_state(&self, operation: &'static str) -> TelemetryError {
        TelemetryError::InvalidSpanState {
            span: self.name.clone(),
            state: self.state.as_str(),
            operation,
        }
    }
}

fn wall_millis(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta
        .num_microseconds()
        .map(|us| us as f64 / 1000.0)
        .unwrap_or_else(|| delta.num_milliseconds() as f64)
}

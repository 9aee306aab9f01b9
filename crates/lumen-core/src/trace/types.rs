//! Span options, contexts, errors and log entries

use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Span tags: a JSON object, merged deeply on `add_tags`
pub type Tags = Map<String, Value>;

/// Deep-merge `source` into `target`
///
/// Nested objects merge key by key; any other value replaces the target's.
pub fn merge_tags(target: &mut Tags, source: Tags) {
    for (key, value) in source {
        match value {
            Value::Object(incoming) => match target.get_mut(&key) {
                Some(Value::Object(existing)) => merge_tags(existing, incoming),
                _ => {
                    target.insert(key, Value::Object(incoming));
                }
            },
            value => {
                target.insert(key, value);
            }
        }
    }
}

/// Span kind used when none is given
pub const DEFAULT_SPAN_KIND: &str = "custom";

/// Priority used when none is given
pub const DEFAULT_PRIORITY: u8 = 5;

/// Lifecycle state of a span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanState {
    #[default]
    Created,
    Started,
    Finished,
}

impl SpanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for SpanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a span as seen by its children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
    pub sampled: bool,
}

/// Options for creating a span
///
/// `trace_id`, `parent_id` and `sampled` carry identity received from a remote
/// caller; a local parent is given through [`SpanOptions::child_of`] and takes
/// precedence over them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanOptions {
    pub id: Option<String>,
    pub trace_id: Option<String>,
    pub parent_id: Option<String>,
    pub kind: Option<String>,
    pub service: Option<String>,
    pub priority: Option<u8>,
    pub sampled: Option<bool>,
    pub tags: Tags,
    pub start_time: Option<DateTime<Utc>>,
    pub parent: Option<SpanContext>,
}

impl SpanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = Some(sampled);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        merge_tags(&mut self.tags, tags);
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Make the span a child of `parent`
    pub fn child_of(mut self, parent: SpanContext) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Error attached to a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SpanError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: None,
            kind: None,
            data: None,
        }
    }

    /// Build from any error; the name is the error's type name
    pub fn from_error<E: StdError>(error: &E) -> Self {
        let type_name = std::any::type_name::<E>();
        let name = type_name
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(type_name);
        Self::new(name, error.to_string())
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// The listed fields that are set, as span tags
    pub fn pick(&self, fields: &[String]) -> Tags {
        let mut tags = Tags::new();
        for field in fields {
            let value = match field.as_str() {
                "name" => Some(Value::from(self.name.clone())),
                "message" => Some(Value::from(self.message.clone())),
                "code" => self.code.map(Value::from),
                "kind" => self.kind.clone().map(Value::from),
                "data" => self.data.clone(),
                _ => None,
            };
            if let Some(value) = value {
                tags.insert(field.clone(), value);
            }
        }
        tags
    }
}

impl fmt::Display for SpanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Timestamped event recorded on a span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanLog {
    pub name: String,
    pub fields: Tags,
    pub time: DateTime<Utc>,
    /// Milliseconds since the previous log, or since the span started
    pub elapsed: f64,
}

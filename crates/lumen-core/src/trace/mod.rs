//! Distributed tracing
//!
//! A [`Tracer`] creates [`Span`]s, decides once per trace whether it is
//! sampled and forwards sampled spans to its [`TraceExporter`]s.

mod exporter;
mod rate_limiter;
mod span;
mod tracer;
mod types;


pub use exporter::TraceExporter;
pub use rate_limiter::RateLimiter;
pub use span::Span;
pub use tracer::Tracer;
pub use types::{
    DEFAULT_PRIORITY, DEFAULT_SPAN_KIND, SpanContext, SpanError, SpanLog, SpanOptions, SpanState,
    Tags, merge_tags,
};

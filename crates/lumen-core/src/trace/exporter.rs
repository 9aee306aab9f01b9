//! Trace exporter interface

use async_trait::async_trait;

use super::span::Span;
use super::tracer::Tracer;
use crate::error::TelemetryResult;

/// Push sink for sampled spans
///
/// Hooks run synchronously on the thread that starts or finishes the span
/// and receive it mutably so they can keep state in [`Span::meta`].
#[async_trait]
pub trait TraceExporter: Send + Sync {
    /// Called once from `Tracer::init`
    fn init(&self, _tracer: &Tracer) -> TelemetryResult<()> {
        Ok(())
    }

    fn span_started(&self, _span: &mut Span) {}

    fn span_finished(&self, span: &mut Span);

    /// Flush and release resources
    async fn stop(&self) {}
}

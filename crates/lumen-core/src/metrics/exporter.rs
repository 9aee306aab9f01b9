//! Sinks and sources attached to a registry
//!
//! Exporters receive every change synchronously on the mutating thread and
//! must not block; anything slow belongs on the exporter's own task.
//! Collectors run on the registry's collection task and feed values in.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use super::labels::Labels;
use super::metric::Metric;
use super::registry::MetricRegistry;
use crate::error::TelemetryResult;

/// A single value change pushed to exporters
#[derive(Debug, Clone)]
pub struct MetricChange {
    pub metric: Arc<Metric>,
    /// New value of the slot; `null` for resets that have no single value
    pub value: Value,
    pub labels: Labels,
    pub timestamp: DateTime<Utc>,
}

/// Push sink for metric changes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricExporter: Send + Sync {
    /// Called once from `MetricRegistry::init`
    fn init(&self, _registry: &MetricRegistry) -> TelemetryResult<()> {
        Ok(())
    }

    /// Called after every mutation, outside the metric's lock
    fn metric_changed(&self, change: &MetricChange);

    /// Flush and release resources
    async fn stop(&self) {}
}

/// Periodic source of values, run by the registry's collection task
pub trait MetricCollector: Send + Sync {
    fn collect(&self, registry: &MetricRegistry) -> TelemetryResult<()>;
}

impl<F> MetricCollector for F
where
    F: Fn(&MetricRegistry) -> TelemetryResult<()> + Send + Sync,
{
    fn collect(&self, registry: &MetricRegistry) -> TelemetryResult<()> {
        self(registry)
    }
}

/// Exporter list shared between a registry and its metrics
#[derive(Clone, Default)]
pub(crate) struct ChangeNotifier {
    exporters: Arc<RwLock<Vec<Arc<dyn MetricExporter>>>>,
}

impl ChangeNotifier {
    pub(crate) fn add(&self, exporter: Arc<dyn MetricExporter>) {
        self.exporters.write().push(exporter);
    }

    pub(crate) fn exporters(&self) -> Vec<Arc<dyn MetricExporter>> {
        self.exporters.read().clone()
    }

    pub(crate) fn notify(&self, change: &MetricChange) {
        // Released before the hooks run so an exporter may touch the registry
        let exporters = self.exporters();
        for exporter in exporters {
            exporter.metric_changed(change);
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("exporters", &self.exporters.read().len())
            .finish()
    }
}

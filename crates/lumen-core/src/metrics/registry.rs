//! Metric registry
//!
//! The registry owns every metric of one host, resolves kinds (built-in or
//! defined through [`MetricRegistry::define_kind`]), dispatches mutations by
//! name and runs the periodic collection and rate-tick tasks between
//! [`MetricRegistry::init`] and [`MetricRegistry::stop`].

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use glob::Pattern;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::exporter::{ChangeNotifier, MetricChange, MetricCollector, MetricExporter};
use super::labels::Labels;
use super::metric::{Metric, MetricFactory};
use super::timer::MetricTimer;
use super::types::{MetricKind, MetricOptions, MetricSnapshot};
use crate::clock::{SharedClock, SystemClock};
use crate::config::MetricsConfig;
use crate::error::{TelemetryError, TelemetryResult};

static METRIC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-:.]*$").expect("valid metric name regex"));

static LABEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-.]*$").expect("valid label name regex"));

/// Selection applied by [`MetricRegistry::list`]
///
/// Kinds filter first, then `includes` (any glob must match), then
/// `excludes` (no glob may match). Unset fields select everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub kinds: Option<Vec<MetricKind>>,
    pub includes: Option<Vec<String>>,
    pub excludes: Option<Vec<String>>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: impl Into<MetricKind>) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind.into());
        self
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.get_or_insert_with(Vec::new).push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.get_or_insert_with(Vec::new).push(pattern.into());
        self
    }
}

fn compile_globs(patterns: Option<&Vec<String>>) -> TelemetryResult<Option<Vec<Pattern>>> {
    patterns
        .map(|patterns| {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| {
                        TelemetryError::config(format!("invalid metric pattern '{}': {}", p, e))
                    })
                })
                .collect()
        })
        .transpose()
}

struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub(crate) struct RegistryInner {
    config: MetricsConfig,
    clock: SharedClock,
    store: RwLock<BTreeMap<String, Arc<Metric>>>,
    factories: RwLock<HashMap<String, Arc<dyn MetricFactory>>>,
    notifier: ChangeNotifier,
    collectors: RwLock<Vec<Arc<dyn MetricCollector>>>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            tasks.cancel.cancel();
        }
    }
}

/// Registry of named metrics
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct MetricRegistry {
    inner: Arc<RegistryInner>,
}

impl MetricRegistry {
    /// Create a registry reading time from the system clock
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a registry reading time from `clock`
    pub fn with_clock(config: MetricsConfig, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                clock,
                store: RwLock::new(BTreeMap::new()),
                factories: RwLock::new(HashMap::new()),
                notifier: ChangeNotifier::default(),
                collectors: RwLock::new(Vec::new()),
                tasks: Mutex::new(None),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    /// Make a custom metric kind available to `register`
    pub fn define_kind(
        &self,
        kind: impl Into<String>,
        factory: impl MetricFactory + 'static,
    ) -> TelemetryResult<()> {
        let kind = kind.into();
        if MetricKind::from(kind.as_str()).is_builtin() {
            return Err(TelemetryError::config(format!(
                "metric kind '{}' is built in and cannot be redefined",
                kind
            )));
        }
        debug!("Defining metric kind '{}'", kind);
        self.inner.factories.write().insert(kind, Arc::new(factory));
        Ok(())
    }

    /// Register a metric
    ///
    /// Returns `Ok(None)` on a disabled registry. Registering a name again with
    /// the same kind and label schema returns the existing metric.
    pub fn register(&self, options: MetricOptions) -> TelemetryResult<Option<Arc<Metric>>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        validate_names(&options)?;

        if let Some(existing) = self.inner.store.read().get(&options.name) {
            return reuse(existing, &options).map(Some);
        }

        let custom = match &options.kind {
            MetricKind::Custom(kind) => {
                let factory = self
                    .inner
                    .factories
                    .read()
                    .get(kind)
                    .cloned()
                    .ok_or_else(|| {
                        TelemetryError::config(format!("unknown metric kind '{}'", kind))
                    })?;
                Some(factory.create(&options)?)
            }
            _ => None,
        };

        let metric = Arc::new(Metric::new(
            &options,
            &self.inner.config,
            custom,
            self.inner.notifier.clone(),
            Arc::clone(&self.inner.clock),
        )?);

        let mut store = self.inner.store.write();
        match store.entry(options.name.clone()) {
            Entry::Occupied(entry) => reuse(entry.get(), &options).map(Some),
            Entry::Vacant(entry) => {
                debug!(
                    "Registered {} metric '{}' with labels {:?}",
                    options.kind, options.name, options.label_names
                );
                entry.insert(Arc::clone(&metric));
                Ok(Some(metric))
            }
        }
    }

    pub fn get_metric(&self, name: &str) -> Option<Arc<Metric>> {
        self.inner.store.read().get(name).cloned()
    }

    pub fn has_metric(&self, name: &str) -> bool {
        self.inner.store.read().contains_key(name)
    }

    /// Number of registered metrics
    pub fn len(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn writable(&self, name: &str) -> TelemetryResult<Option<Arc<Metric>>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        self.get_metric(name)
            .map(Some)
            .ok_or_else(|| TelemetryError::MetricNotFound(name.to_string()))
    }

    pub fn increment(
        &self,
        name: &str,
        labels: Option<&Labels>,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        match self.writable(name)? {
            Some(metric) => metric.increment(labels, value, timestamp),
            None => Ok(()),
        }
    }

    pub fn decrement(
        &self,
        name: &str,
        labels: Option<&Labels>,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        match self.writable(name)? {
            Some(metric) => metric.decrement(labels, value, timestamp),
            None => Ok(()),
        }
    }

    pub fn set(
        &self,
        name: &str,
        labels: Option<&Labels>,
        value: impl Into<Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        match self.writable(name)? {
            Some(metric) => metric.set(labels, value, timestamp),
            None => Ok(()),
        }
    }

    pub fn observe(
        &self,
        name: &str,
        labels: Option<&Labels>,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        match self.writable(name)? {
            Some(metric) => metric.observe(labels, value, timestamp),
            None => Ok(()),
        }
    }

    pub fn reset(
        &self,
        name: &str,
        labels: Option<&Labels>,
        timestamp: Option<DateTime<Utc>>,
    ) -> TelemetryResult<()> {
        match self.writable(name)? {
            Some(metric) => metric.reset(labels, timestamp),
            None => Ok(()),
        }
    }

    pub fn reset_all(&self, name: &str, timestamp: Option<DateTime<Utc>>) -> TelemetryResult<()> {
        match self.writable(name)? {
            Some(metric) => metric.reset_all(timestamp),
            None => Ok(()),
        }
    }

    /// Start timing an operation recorded into histogram or gauge `name`
    pub fn timer(&self, name: impl Into<String>, labels: Option<Labels>) -> MetricTimer {
        MetricTimer::new(self.clone(), name.into(), labels)
    }

    /// Snapshots of the metrics selected by `filter`, ordered by name
    pub fn list(&self, filter: &ListFilter) -> TelemetryResult<Vec<MetricSnapshot>> {
        let includes = compile_globs(filter.includes.as_ref())?;
        let excludes = compile_globs(filter.excludes.as_ref())?;

        let metrics: Vec<Arc<Metric>> = self
            .inner
            .store
            .read()
            .values()
            .filter(|m| {
                filter
                    .kinds
                    .as_ref()
                    .is_none_or(|kinds| kinds.contains(m.kind()))
            })
            .filter(|m| {
                includes
                    .as_ref()
                    .is_none_or(|globs| globs.iter().any(|g| g.matches(m.name())))
            })
            .filter(|m| {
                excludes
                    .as_ref()
                    .is_none_or(|globs| !globs.iter().any(|g| g.matches(m.name())))
            })
            .cloned()
            .collect();

        Ok(metrics.iter().map(|m| m.snapshot()).collect())
    }

    /// Push a change to every exporter
    pub fn changed(
        &self,
        metric: &Arc<Metric>,
        value: Value,
        labels: Labels,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.inner.notifier.notify(&MetricChange {
            metric: Arc::clone(metric),
            value,
            labels,
            timestamp: timestamp.unwrap_or_else(|| self.inner.clock.wall()),
        });
    }

    pub fn add_exporter(&self, exporter: Arc<dyn MetricExporter>) {
        self.inner.notifier.add(exporter);
    }

    pub fn add_collector(&self, collector: impl MetricCollector + 'static) {
        self.inner.collectors.write().push(Arc::new(collector));
    }

    /// Run every collector once; failures are logged and skipped
    pub fn collect(&self) {
        let collectors = self.inner.collectors.read().clone();
        for collector in collectors {
            if let Err(e) = collector.collect(self) {
                warn!("Metric collector failed: {}", e);
            }
        }
    }

    /// Advance every rate meter once
    pub fn tick_rates(&self) {
        let metrics: Vec<Arc<Metric>> = self.inner.store.read().values().cloned().collect();
        for metric in metrics {
            metric.tick_rates();
        }
    }

    /// Initialize exporters and start the periodic tasks
    ///
    /// Must be called from within a tokio runtime. Calling it again while the
    /// tasks are running does nothing. Fails on a configuration the tasks
    /// cannot run with, such as a zero interval.
    pub fn init(&self) -> TelemetryResult<()> {
        if !self.is_enabled() {
            debug!("Metric registry disabled, skipping init");
            return Ok(());
        }
        self.inner.config.validate()?;
        if self.inner.tasks.lock().is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|e| {
            TelemetryError::runtime(format!("metric registry init requires a tokio runtime: {}", e))
        })?;

        for exporter in self.inner.notifier.exporters() {
            exporter.init(self)?;
        }

        let cancel = CancellationToken::new();
        let weak = Arc::downgrade(&self.inner);
        let handles = vec![
            spawn_periodic(
                &runtime,
                weak.clone(),
                cancel.clone(),
                self.inner.config.collect_interval,
                MetricRegistry::collect,
            ),
            spawn_periodic(
                &runtime,
                weak,
                cancel.clone(),
                self.inner.config.rate_tick_interval,
                MetricRegistry::tick_rates,
            ),
        ];

        let mut tasks = self.inner.tasks.lock();
        if tasks.is_some() {
            cancel.cancel();
            return Ok(());
        }
        *tasks = Some(BackgroundTasks { cancel, handles });
        debug!(
            "Metric registry started (collect every {:?}, rates every {:?})",
            self.inner.config.collect_interval, self.inner.config.rate_tick_interval
        );
        Ok(())
    }

    /// Cancel the periodic tasks and stop every exporter
    pub async fn stop(&self) {
        let tasks = self.inner.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.cancel.cancel();
            for handle in tasks.handles {
                if let Err(e) = handle.await {
                    warn!("Metric registry task ended abnormally: {}", e);
                }
            }
        }

        for exporter in self.inner.notifier.exporters() {
            exporter.stop().await;
        }
        debug!("Metric registry stopped");
    }

    /// Whether the periodic tasks are running
    pub fn is_running(&self) -> bool {
        self.inner.tasks.lock().is_some()
    }
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("enabled", &self.inner.config.enabled)
            .field("metrics", &self.len())
            .field("exporters", &self.inner.notifier)
            .field("running", &self.is_running())
            .finish()
    }
}

fn spawn_periodic(
    runtime: &Handle,
    inner: Weak<RegistryInner>,
    cancel: CancellationToken,
    period: Duration,
    job: fn(&MetricRegistry),
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let Some(inner) = inner.upgrade() else { break };
                    job(&MetricRegistry { inner });
                }
            }
        }
    })
}

fn validate_names(options: &MetricOptions) -> TelemetryResult<()> {
    if !METRIC_NAME_RE.is_match(&options.name) {
        return Err(TelemetryError::config(format!(
            "invalid metric name '{}'",
            options.name
        )));
    }
    for (i, label) in options.label_names.iter().enumerate() {
        if !LABEL_NAME_RE.is_match(label) {
            return Err(TelemetryError::config(format!(
                "invalid label name '{}' on metric '{}'",
                label, options.name
            )));
        }
        if options.label_names[..i].contains(label) {
            return Err(TelemetryError::config(format!(
                "duplicate label name '{}' on metric '{}'",
                label, options.name
            )));
        }
    }
    Ok(())
}

fn reuse(existing: &Arc<Metric>, options: &MetricOptions) -> TelemetryResult<Arc<Metric>> {
    if existing.matches(options) {
        Ok(Arc::clone(existing))
    } else {
        Err(TelemetryError::config(format!(
            "metric '{}' is already registered as {} with labels {:?}",
            options.name,
            existing.kind(),
            existing.label_names()
        )))
    }
}

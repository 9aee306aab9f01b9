//! Tests for the metric registry

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::exporter::MockMetricExporter;
use super::*;
use crate::clock::ManualClock;
use crate::config::MetricsConfig;
use crate::error::{TelemetryError, TelemetryResult};

fn registry() -> (MetricRegistry, ManualClock) {
    let clock = ManualClock::new();
    let registry = MetricRegistry::with_clock(MetricsConfig::default(), clock.shared());
    (registry, clock)
}

fn number(registry: &MetricRegistry, name: &str, labels: Option<&Labels>) -> Option<f64> {
    registry.get_metric(name)?.get(labels)?.number()
}

#[test]
fn test_register_and_get() {
    let (registry, _) = registry();
    let metric = registry
        .register(MetricOptions::counter("requests_total").with_description("Total requests"))
        .unwrap()
        .unwrap();

    let fetched = registry.get_metric("requests_total").unwrap();
    assert!(Arc::ptr_eq(&metric, &fetched));
    assert!(registry.has_metric("requests_total"));
    assert_eq!(fetched.description(), Some("Total requests"));
    assert_eq!(fetched.aggregator(), Aggregator::Sum);
    assert!(registry.get_metric("missing").is_none());
}

#[test]
fn test_invalid_names_leave_store_unchanged() {
    let (registry, _) = registry();

    for name in ["9lives", "has space", "", "emoji🙂"] {
        let err = registry.register(MetricOptions::gauge(name)).unwrap_err();
        assert!(err.is_config(), "{name} should be rejected");
    }
    let err = registry
        .register(MetricOptions::gauge("ok_name").with_labels(["bad:label"]))
        .unwrap_err();
    assert!(err.is_config());
    let err = registry
        .register(MetricOptions::gauge("ok_name").with_labels(["a", "a"]))
        .unwrap_err();
    assert!(err.is_config());

    assert!(registry.is_empty());
}

#[test]
fn test_accepted_name_characters() {
    let (registry, _) = registry();
    registry
        .register(MetricOptions::gauge("service.request-time:total_ms").with_labels(["_node.id-1"]))
        .unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_reregistration() {
    let (registry, _) = registry();
    let first = registry
        .register(MetricOptions::counter("jobs").with_labels(["queue"]))
        .unwrap()
        .unwrap();
    let second = registry
        .register(MetricOptions::counter("jobs").with_labels(["queue"]))
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let err = registry.register(MetricOptions::gauge("jobs")).unwrap_err();
    assert!(err.is_config());
    assert_eq!(registry.get_metric("jobs").unwrap().kind(), &MetricKind::Counter);
}

#[test]
fn test_counter_sums_increments_and_rejects_decrement() {
    let (registry, _) = registry();
    registry.register(MetricOptions::counter("requests_total")).unwrap();

    registry.increment("requests_total", None, 1.0, None).unwrap();
    registry.increment("requests_total", None, 1.0, None).unwrap();
    registry.increment("requests_total", None, 5.0, None).unwrap();
    assert_eq!(number(&registry, "requests_total", None), Some(7.0));

    let err = registry
        .decrement("requests_total", None, 1.0, None)
        .unwrap_err();
    assert!(matches!(
        err,
        TelemetryError::TypeMismatch {
            operation: "decrement",
            ..
        }
    ));
    assert_eq!(number(&registry, "requests_total", None), Some(7.0));
}

#[test]
fn test_operation_not_supported_by_kind() {
    let (registry, _) = registry();
    registry.register(MetricOptions::gauge("temperature")).unwrap();
    registry.register(MetricOptions::info("build")).unwrap();
    registry
        .register(MetricOptions::histogram("latency").with_default_buckets())
        .unwrap();

    let err = registry.observe("temperature", None, 1.0, None).unwrap_err();
    assert_eq!(err.error_code(), "TELEMETRY_TYPE_MISMATCH");
    let err = registry.increment("build", None, 1.0, None).unwrap_err();
    assert_eq!(err.error_code(), "TELEMETRY_TYPE_MISMATCH");
    let err = registry.set("latency", None, 3.0, None).unwrap_err();
    assert_eq!(err.error_code(), "TELEMETRY_TYPE_MISMATCH");

    assert!(registry.get_metric("latency").unwrap().get(None).is_none());
}

#[test]
fn test_invalid_values_rejected() {
    let (registry, _) = registry();
    registry.register(MetricOptions::gauge("temperature")).unwrap();

    let err = registry
        .set("temperature", None, "warm", None)
        .unwrap_err();
    assert_eq!(err.error_code(), "TELEMETRY_INVALID_VALUE");
    let err = registry
        .increment("temperature", None, f64::NAN, None)
        .unwrap_err();
    assert_eq!(err.error_code(), "TELEMETRY_INVALID_VALUE");
    assert!(number(&registry, "temperature", None).is_none());
}

#[test]
fn test_unknown_metric() {
    let (registry, _) = registry();
    let err = registry.increment("nope", None, 1.0, None).unwrap_err();
    assert_eq!(err, TelemetryError::MetricNotFound("nope".to_string()));
}

#[test]
fn test_disabled_registry_is_silent() {
    let registry = MetricRegistry::new(MetricsConfig::disabled());
    assert!(!registry.is_enabled());
    assert!(registry.register(MetricOptions::counter("c")).unwrap().is_none());
    registry.increment("c", None, 1.0, None).unwrap();
    registry.observe("anything", None, 1.0, None).unwrap();
    assert!(registry.list(&ListFilter::new()).unwrap().is_empty());
}

#[test]
fn test_gauge_operations_with_labels() {
    let (registry, _) = registry();
    registry
        .register(MetricOptions::gauge("connections").with_labels(["pool"]))
        .unwrap();
    let db = Labels::new().with("pool", "db");
    let cache = Labels::new().with("pool", "cache");

    registry.increment("connections", Some(&db), 3.0, None).unwrap();
    registry.decrement("connections", Some(&db), 1.0, None).unwrap();
    registry.set("connections", Some(&cache), 10, None).unwrap();

    assert_eq!(number(&registry, "connections", Some(&db)), Some(2.0));
    assert_eq!(number(&registry, "connections", Some(&cache)), Some(10.0));

    registry.reset("connections", Some(&cache), None).unwrap();
    assert_eq!(number(&registry, "connections", Some(&cache)), Some(0.0));

    registry.reset_all("connections", None).unwrap();
    assert_eq!(number(&registry, "connections", Some(&db)), Some(0.0));
}

#[test]
fn test_label_hash_ignores_extra_keys_and_order() {
    let (registry, _) = registry();
    registry
        .register(MetricOptions::counter("calls").with_labels(["action", "node"]))
        .unwrap();

    let first: Labels = [("action", "posts.find"), ("node", "n1")].into();
    let second = Labels::new()
        .with("node", "n1")
        .with("caller", "api")
        .with("action", "posts.find");

    registry.increment("calls", Some(&first), 1.0, None).unwrap();
    registry.increment("calls", Some(&second), 1.0, None).unwrap();

    let snapshot = registry.get_metric("calls").unwrap().snapshot();
    assert_eq!(snapshot.values.len(), 1);
    assert_eq!(snapshot.values[0].number(), Some(2.0));
    assert_eq!(snapshot.values[0].key, "posts.find|n1");
    assert!(snapshot.values[0].labels.get("caller").is_none());
}

#[test]
fn test_histogram_latency_buckets() {
    let (registry, _) = registry();
    registry
        .register(
            MetricOptions::histogram("latency")
                .with_buckets(BucketSpec::Explicit(vec![1.0, 10.0, 25.0, 50.0, 90.0, 100.0])),
        )
        .unwrap();

    for v in [5.0, 15.0, 30.0, 95.0] {
        registry.observe("latency", None, v, None).unwrap();
    }

    let snapshot = registry.get_metric("latency").unwrap().get(None).unwrap();
    let value = snapshot.histogram().unwrap();
    assert_eq!(value.count, 4);
    assert_eq!(value.sum, 145.0);
    assert_eq!(
        value.buckets.as_deref(),
        Some(
            &[
                (1.0, 0),
                (10.0, 1),
                (25.0, 2),
                (50.0, 3),
                (90.0, 3),
                (100.0, 4)
            ][..]
        )
    );
}

/// Small deterministic generator for observation sequences
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next() % items.len() as u64) as usize]
    }
}

fn assert_histogram_invariants(value: &HistogramValue, exceeded_last_bound: bool) {
    let buckets = value.buckets.as_ref().unwrap();
    for pair in buckets.windows(2) {
        assert!(pair[0].0 < pair[1].0, "bounds not ascending: {buckets:?}");
        assert!(pair[0].1 <= pair[1].1, "cumulative counts decreased: {buckets:?}");
    }
    let (_, last) = buckets.last().unwrap();
    if exceeded_last_bound {
        assert!(*last <= value.count);
    } else {
        assert_eq!(*last, value.count);
    }

    let quantiles: Vec<f64> = value
        .quantiles
        .as_ref()
        .unwrap()
        .iter()
        .filter_map(|(_, v)| *v)
        .collect();
    for pair in quantiles.windows(2) {
        assert!(pair[0] <= pair[1], "quantiles decreased: {quantiles:?}");
    }
    if let (Some(min), Some(max)) = (value.min, value.max) {
        assert!(quantiles.iter().all(|q| (min..=max).contains(q)));
    }
}

#[test]
fn test_histogram_invariants_hold_for_generated_sequences() {
    // Includes duplicates, negatives, zero and values equal to default bounds
    let values = [
        -12.0, -0.5, 0.0, 0.5, 0.5, 1.0, 2.5, 3.3, 10.0, 10.0, 42.0, 250.0, 999.9, 5000.0,
        10000.0,
    ];
    let routes = ["users.get", "users.list", "posts.find"];

    for seed in 1..=6u64 {
        let (registry, clock) = registry();
        let metric = registry
            .register(
                MetricOptions::histogram("request.duration")
                    .with_labels(["route"])
                    .with_default_buckets()
                    .with_default_quantiles(),
            )
            .unwrap()
            .unwrap();

        let mut rng = Xorshift(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut exceeded: BTreeMap<String, bool> = BTreeMap::new();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();

        for i in 0..80 {
            if i == 40 {
                clock.advance(Duration::from_secs(30));
            }
            let route = rng.pick(&routes).to_string();
            // Odd seeds occasionally overflow the last bound
            let value = if seed % 2 == 1 && rng.next() % 11 == 0 {
                12_500.0
            } else {
                *rng.pick(&values)
            };

            let labels = Labels::new().with("route", route.clone());
            registry
                .observe("request.duration", Some(&labels), value, None)
                .unwrap();
            *exceeded.entry(route.clone()).or_default() |= value > 10_000.0;
            *counts.entry(route.clone()).or_default() += 1;

            let snapshot = metric.get(Some(&labels)).unwrap();
            let histogram = snapshot.histogram().unwrap();
            assert_eq!(histogram.count, counts[&route]);
            assert_histogram_invariants(histogram, exceeded[&route]);
        }

        for value in metric.snapshot().values {
            let route = value.labels.get("route").unwrap().as_str().unwrap().to_string();
            assert_histogram_invariants(value.histogram().unwrap(), exceeded[&route]);
        }
    }
}

#[test]
fn test_histogram_default_buckets_and_quantiles() {
    let (registry, _) = registry();
    let metric = registry
        .register(
            MetricOptions::histogram("payload")
                .with_default_buckets()
                .with_default_quantiles(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(metric.buckets(), Some(MetricsConfig::default().default_buckets));
    assert_eq!(metric.quantiles(), Some(vec![0.5, 0.9, 0.95, 0.99, 0.999]));

    for v in 1..=100 {
        registry.observe("payload", None, v as f64, None).unwrap();
    }
    let snapshot = metric.get(None).unwrap();
    let value = snapshot.histogram().unwrap();
    assert_eq!(value.quantile(0.5), Some(50.0));
    assert_eq!(value.quantile(0.99), Some(99.0));
    assert_eq!(value.min, Some(1.0));
    assert_eq!(value.max, Some(100.0));
}

#[test]
fn test_histogram_quantiles_follow_the_window() {
    let (registry, clock) = registry();
    registry
        .register(
            MetricOptions::histogram("latency")
                .with_quantiles(QuantileOptions::new(vec![0.5]).with_window(Duration::from_secs(60), 6)),
        )
        .unwrap();

    registry.observe("latency", None, 40.0, None).unwrap();
    let metric = registry.get_metric("latency").unwrap();
    let before = metric.snapshot();
    assert_eq!(before.values[0].histogram().unwrap().quantile(0.5), Some(40.0));

    clock.advance(Duration::from_secs(61));
    let after = metric.snapshot();
    let value = after.values[0].histogram().unwrap();
    assert_eq!(value.count, 1);
    assert_eq!(value.quantile(0.5), None);
    assert!(value.mean.is_none());
}

#[test]
fn test_bucket_options_rejected_on_other_kinds() {
    let (registry, _) = registry();
    let err = registry
        .register(MetricOptions::gauge("g").with_default_buckets())
        .unwrap_err();
    assert!(err.is_config());
    let err = registry
        .register(MetricOptions::info("i").with_rate(true))
        .unwrap_err();
    assert!(err.is_config());
    let err = registry
        .register(
            MetricOptions::histogram("h").with_quantiles(QuantileOptions::new(vec![0.5, 2.0])),
        )
        .unwrap_err();
    assert!(err.is_config());
    assert!(registry.is_empty());
}

#[test]
fn test_info_metric() {
    let (registry, _) = registry();
    registry.register(MetricOptions::info("os.hostname")).unwrap();
    registry.set("os.hostname", None, "web-1", None).unwrap();

    let value = registry.get_metric("os.hostname").unwrap().get(None).unwrap();
    assert_eq!(value.info(), Some(&json!("web-1")));
}

#[test]
fn test_snapshot_memoized_until_mutation() {
    let (registry, _) = registry();
    let metric = registry
        .register(MetricOptions::gauge("temperature"))
        .unwrap()
        .unwrap();
    metric.set(None, 21.0, None).unwrap();

    let first = metric.snapshot();
    let second = metric.snapshot();
    assert_eq!(first, second);

    metric.set(None, 22.0, None).unwrap();
    let third = metric.snapshot();
    assert_eq!(third.values[0].number(), Some(22.0));
}

#[test]
fn test_explicit_timestamp_is_kept() {
    let (registry, _) = registry();
    registry.register(MetricOptions::gauge("temperature")).unwrap();
    let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    registry.set("temperature", None, 1.0, Some(at)).unwrap();
    let value = registry.get_metric("temperature").unwrap().get(None).unwrap();
    assert_eq!(value.timestamp, at);
}

#[test]
fn test_list_filters() {
    let (registry, _) = registry();
    registry.register(MetricOptions::counter("http.requests")).unwrap();
    registry.register(MetricOptions::gauge("http.connections")).unwrap();
    registry.register(MetricOptions::histogram("http.latency")).unwrap();
    registry.register(MetricOptions::gauge("process.memory")).unwrap();

    let names = |filter: ListFilter| -> Vec<String> {
        registry
            .list(&filter)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect()
    };

    assert_eq!(names(ListFilter::new()).len(), 4);
    assert_eq!(
        names(ListFilter::new().with_kind(MetricKind::Gauge)),
        vec!["http.connections", "process.memory"]
    );
    assert_eq!(
        names(ListFilter::new().include("http.*").exclude("*.latency")),
        vec!["http.connections", "http.requests"]
    );
    assert_eq!(
        names(ListFilter::new().include("process.*").include("*.requests")),
        vec!["http.requests", "process.memory"]
    );

    let err = registry.list(&ListFilter::new().include("a[")).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_timer_records_elapsed_milliseconds() {
    let (registry, clock) = registry();
    registry
        .register(MetricOptions::histogram("job.duration").with_labels(["job"]))
        .unwrap();
    registry.register(MetricOptions::gauge("last.duration")).unwrap();

    let labels = Labels::new().with("job", "sync");
    let timer = registry.timer("job.duration", Some(labels.clone()));
    let gauge_timer = registry.timer("last.duration", None);
    clock.advance_millis(250);
    assert_eq!(timer.elapsed(), Duration::from_millis(250));

    assert_eq!(timer.stop().unwrap(), 250.0);
    assert_eq!(gauge_timer.stop().unwrap(), 250.0);

    let histogram = registry
        .get_metric("job.duration")
        .unwrap()
        .get(Some(&labels))
        .unwrap();
    assert_eq!(histogram.histogram().unwrap().sum, 250.0);
    assert_eq!(number(&registry, "last.duration", None), Some(250.0));

    // Unknown metric only reports the duration
    let orphan = registry.timer("missing", None);
    clock.advance_millis(5);
    assert_eq!(orphan.stop().unwrap(), 5.0);
}

#[test]
fn test_exporter_receives_changes() {
    let (registry, _) = registry();
    let mut exporter = MockMetricExporter::new();
    exporter
        .expect_metric_changed()
        .withf(|change| {
            change.metric.name() == "requests_total"
                && change.labels.get("method") == Some(&json!("GET"))
        })
        .times(2)
        .return_const(());
    registry.add_exporter(Arc::new(exporter));

    registry
        .register(MetricOptions::counter("requests_total").with_labels(["method"]))
        .unwrap();
    let labels = Labels::new().with("method", "GET").with("path", "/");
    registry.increment("requests_total", Some(&labels), 1.0, None).unwrap();
    registry.increment("requests_total", Some(&labels), 1.0, None).unwrap();

    // Rejected mutations never reach exporters
    assert!(registry.decrement("requests_total", Some(&labels), 1.0, None).is_err());
}

#[test]
fn test_rate_tick_updates_rate_and_notifies() {
    let (registry, clock) = registry();
    let mut exporter = MockMetricExporter::new();
    exporter.expect_metric_changed().times(2).return_const(());
    registry.add_exporter(Arc::new(exporter));

    registry
        .register(MetricOptions::counter("events").with_rate(true))
        .unwrap();
    registry.increment("events", None, 10.0, None).unwrap();

    clock.advance(Duration::from_secs(5));
    registry.tick_rates();

    let value = registry.get_metric("events").unwrap().get(None).unwrap();
    assert_eq!(value.rate(), Some(60.0));
}

#[derive(Debug, Default)]
struct HighWater {
    values: BTreeMap<String, (f64, Labels)>,
}

impl CustomMetric for HighWater {
    fn apply(
        &mut self,
        op: MetricOp<'_>,
        key: &str,
        labels: &Labels,
        _timestamp: DateTime<Utc>,
    ) -> Option<Value> {
        let MetricOp::Set(value) = op else {
            return None;
        };
        let value = value.as_f64()?;
        let slot = self
            .values
            .entry(key.to_string())
            .or_insert((f64::MIN, labels.clone()));
        slot.0 = slot.0.max(value);
        Some(Value::from(slot.0))
    }

    fn reset(&mut self, key: &str, _labels: &Labels, _timestamp: DateTime<Utc>) -> Option<Value> {
        self.values.remove(key).map(|_| Value::Null)
    }

    fn reset_all(&mut self, _timestamp: DateTime<Utc>) -> Vec<(Value, Labels)> {
        std::mem::take(&mut self.values)
            .into_values()
            .map(|(_, labels)| (Value::Null, labels))
            .collect()
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn snapshot(&self) -> Vec<ValueSnapshot> {
        self.values
            .iter()
            .map(|(key, (value, labels))| ValueSnapshot {
                key: key.clone(),
                labels: labels.clone(),
                timestamp: DateTime::<Utc>::default(),
                value: SnapshotValue::Custom {
                    value: Value::from(*value),
                },
            })
            .collect()
    }
}

fn high_water_factory(_options: &MetricOptions) -> TelemetryResult<Box<dyn CustomMetric>> {
    Ok(Box::new(HighWater::default()))
}

#[test]
fn test_custom_kind() {
    let (registry, _) = registry();
    let err = registry
        .register(MetricOptions::new("high_water", "queue.peak"))
        .unwrap_err();
    assert!(err.is_config());

    registry.define_kind("high_water", high_water_factory).unwrap();
    let metric = registry
        .register(MetricOptions::new("high_water", "queue.peak"))
        .unwrap()
        .unwrap();
    assert_eq!(metric.kind(), &MetricKind::Custom("high_water".to_string()));

    for v in [3.0, 9.0, 4.0] {
        registry.set("queue.peak", None, v, None).unwrap();
    }
    let snapshot = metric.snapshot();
    assert_eq!(
        snapshot.values[0].value,
        SnapshotValue::Custom { value: json!(9.0) }
    );

    let err = registry.increment("queue.peak", None, 1.0, None).unwrap_err();
    assert_eq!(err.error_code(), "TELEMETRY_TYPE_MISMATCH");

    let listed = registry
        .list(&ListFilter::new().with_kind("high_water"))
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[test]
fn test_builtin_kinds_cannot_be_redefined() {
    let (registry, _) = registry();
    let err = registry.define_kind("counter", high_water_factory).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_clear_drops_slots() {
    let (registry, _) = registry();
    let metric = registry
        .register(MetricOptions::gauge("g").with_labels(["k"]))
        .unwrap()
        .unwrap();
    metric.set(Some(&Labels::new().with("k", 1)), 1.0, None).unwrap();
    metric.set(Some(&Labels::new().with("k", 2)), 1.0, None).unwrap();
    assert_eq!(metric.snapshot().values.len(), 2);

    metric.clear();
    assert!(metric.snapshot().values.is_empty());
}

#[test]
fn test_init_outside_runtime_fails() {
    let (registry, _) = registry();
    let err = registry.init().unwrap_err();
    assert_eq!(err.error_code(), "TELEMETRY_RUNTIME");
    assert!(!registry.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_runs_collectors_and_exporters() {
    let registry = MetricRegistry::new(
        MetricsConfig::default().with_collect_interval(Duration::from_secs(5)),
    );

    let mut exporter = MockMetricExporter::new();
    exporter.expect_init().times(1).returning(|_| Ok(()));
    exporter.expect_metric_changed().return_const(());
    exporter.expect_stop().times(1).returning(|| ());
    registry.add_exporter(Arc::new(exporter));

    registry.register(MetricOptions::gauge("process.uptime")).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    registry.add_collector(move |registry: &MetricRegistry| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        registry.set("process.uptime", None, n as f64, None)
    });

    registry.init().unwrap();
    assert!(registry.is_running());
    // Second init is a no-op
    registry.init().unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(number(&registry, "process.uptime", None), Some(2.0));

    registry.stop().await;
    assert!(!registry.is_running());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_init_rejects_zero_intervals() {
    for config in [
        MetricsConfig::default().with_collect_interval(Duration::ZERO),
        MetricsConfig::default().with_rate_tick_interval(Duration::ZERO),
    ] {
        let registry = MetricRegistry::new(config);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        registry.add_collector(move |_: &MetricRegistry| -> TelemetryResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let err = registry.init().unwrap_err();
        assert!(err.is_config());
        assert!(!registry.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn test_failing_collector_is_skipped() {
    let registry = MetricRegistry::new(MetricsConfig::default());
    registry.add_collector(|_: &MetricRegistry| -> TelemetryResult<()> {
        Err(TelemetryError::runtime("proc unavailable"))
    });
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    registry.add_collector(move |_: &MetricRegistry| -> TelemetryResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    registry.collect();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

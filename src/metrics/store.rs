//! Metric Store
//!
//! Owns every named time series. Series are bounded ring buffers; each one
//! lives in its own `DashMap` entry so appends and evictions on a series are
//! serialized by the map's exclusive entry lock, whether they come from the
//! sampling task or from a direct `record` call.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::adapters::Notifier;
use crate::domain::events::{NotificationCategory, NotificationSeverity};
use crate::domain::ports::SystemSampler;
use crate::error::{Error, Result};
use crate::task::{PeriodicTask, DEFAULT_STOP_TIMEOUT};

use super::window_start;

/// Default number of points kept per series
pub const DEFAULT_SERIES_CAPACITY: usize = 1000;

/// Series registered at construction: (name, unit, description)
pub const BUILTIN_SERIES: &[(&str, &str, &str)] = &[
    ("cpu_usage", "%", "Host CPU utilisation"),
    ("memory_usage", "MB", "Process resident memory"),
    ("disk_usage", "%", "Disk utilisation of the data volume"),
    ("network_connections", "count", "Open TCP connections"),
    ("api_response_time", "ms", "API response latency"),
    ("api_requests_total", "count", "API requests served"),
    ("api_errors_total", "count", "API requests that failed"),
    ("conversations_active", "count", "Conversations currently open"),
    ("messages_processed", "count", "Chat messages processed"),
    ("event_processing_time", "ms", "Event handler latency"),
];

// =============================================================================
// Points & Series
// =============================================================================

/// A single observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl MetricPoint {
    pub fn new(value: f64, labels: BTreeMap<String, String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            value,
            labels,
        }
    }
}

/// Bounded, ordered sequence of points with FIFO eviction.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    name: String,
    unit: String,
    description: String,
    capacity: usize,
    points: VecDeque<MetricPoint>,
}

impl TimeSeries {
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        description: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            unit: unit.into(),
            description: description.into(),
            capacity,
            points: VecDeque::with_capacity(capacity.min(DEFAULT_SERIES_CAPACITY)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point, evicting the oldest when full.
    pub fn push(&mut self, point: MetricPoint) {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn points(&self) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.back()
    }

    /// Points with `timestamp >= start`; every point when `start` is `None`.
    pub fn since(&self, start: Option<DateTime<Utc>>) -> Vec<MetricPoint> {
        match start {
            Some(start) => self
                .points
                .iter()
                .filter(|p| p.timestamp >= start)
                .cloned()
                .collect(),
            None => self.points.iter().cloned().collect(),
        }
    }
}

/// Aggregate view of one series over a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub unit: String,
    pub description: String,
    pub count: usize,
    pub latest: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
}

// =============================================================================
// Metric Store
// =============================================================================

/// Registry of named time series plus the optional sampling task.
pub struct MetricStore {
    capacity: usize,
    series: DashMap<String, TimeSeries>,
    notifier: Notifier,
    sampling: PeriodicTask,
}

impl MetricStore {
    /// Create a store with the built-in series registered.
    pub fn new(capacity: usize, notifier: Notifier) -> Self {
        let store = Self {
            capacity: capacity.max(1),
            series: DashMap::new(),
            notifier,
            sampling: PeriodicTask::new("metric_sampling"),
        };

        for (name, unit, description) in BUILTIN_SERIES {
            store.register_series(name, unit, description);
        }

        store
    }

    /// Store with default capacity that publishes nothing.
    pub fn in_memory() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY, Notifier::disabled())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a series. Returns `false` if the name already exists.
    pub fn register_series(&self, name: &str, unit: &str, description: &str) -> bool {
        match self.series.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(TimeSeries::new(name, unit, description, self.capacity));
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn has_series(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    /// Registered series names, sorted.
    pub fn series_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of points currently held for `name`.
    pub fn len(&self, name: &str) -> Option<usize> {
        self.series.get(name).map(|s| s.len())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Record a value at the current time.
    pub fn record(&self, name: &str, value: f64) -> Result<()> {
        self.record_at(name, value, BTreeMap::new(), Utc::now())
    }

    /// Record a labelled value at the current time.
    pub fn record_with_labels(
        &self,
        name: &str,
        value: f64,
        labels: BTreeMap<String, String>,
    ) -> Result<()> {
        self.record_at(name, value, labels, Utc::now())
    }

    /// Record a value with an explicit timestamp.
    ///
    /// Unregistered names and non-finite values are logged and rejected;
    /// nothing is stored.
    pub fn record_at(
        &self,
        name: &str,
        value: f64,
        labels: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        if !value.is_finite() {
            warn!(metric = %name, value, "Ignoring non-finite metric value");
            return Err(Error::InvalidValue {
                metric: name.to_string(),
                value,
            });
        }

        let payload = self.notifier.is_enabled().then(|| {
            serde_json::json!({
                "metric": name,
                "value": value,
                "labels": &labels,
                "timestamp": timestamp,
            })
        });

        match self.series.get_mut(name) {
            Some(mut series) => series.push(MetricPoint::new(value, labels, timestamp)),
            None => {
                warn!(metric = %name, "Ignoring value for unregistered metric");
                return Err(Error::UnknownMetric(name.to_string()));
            }
        }

        if let Some(payload) = payload {
            self.notifier.notify(
                NotificationCategory::MetricRecorded,
                payload,
                NotificationSeverity::Low,
                "metric_store",
            );
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Points of `name` with `timestamp >= now - window`.
    pub fn query_recent(&self, name: &str, window: Duration) -> Vec<MetricPoint> {
        self.query_recent_at(name, window, Utc::now())
    }

    /// Points of `name` with `timestamp >= now - window`, for an explicit `now`.
    ///
    /// The result is an owned snapshot; later recordings never change it.
    pub fn query_recent_at(
        &self,
        name: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Vec<MetricPoint> {
        self.series
            .get(name)
            .map(|s| s.since(window_start(now, window)))
            .unwrap_or_default()
    }

    /// Mean over the window, `None` when there is no data.
    pub fn average(&self, name: &str, window: Duration) -> Option<f64> {
        self.average_at(name, window, Utc::now())
    }

    pub fn average_at(&self, name: &str, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        let points = self.query_recent_at(name, window, now);
        if points.is_empty() {
            return None;
        }
        Some(points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64)
    }

    /// Maximum over the window, `None` when there is no data.
    pub fn max(&self, name: &str, window: Duration) -> Option<f64> {
        self.max_at(name, window, Utc::now())
    }

    pub fn max_at(&self, name: &str, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        self.query_recent_at(name, window, now)
            .into_iter()
            .map(|p| p.value)
            .reduce(f64::max)
    }

    /// Minimum over the window, `None` when there is no data.
    pub fn min_at(&self, name: &str, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        self.query_recent_at(name, window, now)
            .into_iter()
            .map(|p| p.value)
            .reduce(f64::min)
    }

    /// Sum over the window, `None` when there is no data.
    pub fn sum_at(&self, name: &str, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        let points = self.query_recent_at(name, window, now);
        if points.is_empty() {
            return None;
        }
        Some(points.iter().map(|p| p.value).sum())
    }

    /// Most recent point regardless of age.
    pub fn latest(&self, name: &str) -> Option<MetricPoint> {
        self.series.get(name).and_then(|s| s.latest().cloned())
    }

    /// Summary of one series over the window.
    pub fn summary_at(
        &self,
        name: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<MetricSummary> {
        let series = self.series.get(name)?;
        let points = series.since(window_start(now, window));
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();

        Some(MetricSummary {
            unit: series.unit().to_string(),
            description: series.description().to_string(),
            count: values.len(),
            latest: series.latest().map(|p| p.value),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
            average: if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            },
        })
    }

    /// Summaries of every series, keyed by name.
    pub fn summaries_at(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, MetricSummary> {
        self.series_names()
            .into_iter()
            .filter_map(|name| {
                let summary = self.summary_at(&name, window, now)?;
                Some((name, summary))
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Sampling
    // -------------------------------------------------------------------------

    /// Run the sampler once and record what it returns.
    ///
    /// Sampler errors and panics are logged; returns the number of values
    /// recorded.
    pub fn sample_once(&self, sampler: &dyn SystemSampler) -> usize {
        let samples = match catch_unwind(AssertUnwindSafe(|| sampler.sample())) {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                error!("System sampling failed: {}", e);
                return 0;
            }
            Err(_) => {
                error!("System sampler panicked");
                return 0;
            }
        };

        samples
            .into_iter()
            .filter(|s| {
                self.record_at(&s.name, s.value, s.labels.clone(), Utc::now())
                    .is_ok()
            })
            .count()
    }

    /// Start the periodic sampling task. A second call is a no-op.
    pub fn start_sampling(self: &Arc<Self>, sampler: Arc<dyn SystemSampler>, period: Duration) -> bool {
        let store = Arc::clone(self);

        self.sampling.start(period, move || {
            let store = Arc::clone(&store);
            let sampler = Arc::clone(&sampler);
            async move {
                let result =
                    tokio::task::spawn_blocking(move || store.sample_once(sampler.as_ref())).await;
                match result {
                    Ok(recorded) => debug!(recorded, "Sampling tick complete"),
                    Err(e) => error!("Sampling tick failed: {}", e),
                }
            }
        })
    }

    /// Stop the sampling task, waiting until it has halted.
    pub async fn stop_sampling(&self) -> bool {
        self.sampling.stop(DEFAULT_STOP_TIMEOUT).await
    }

    pub fn is_sampling(&self) -> bool {
        self.sampling.is_running()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for MetricStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricStore")
            .field("capacity", &self.capacity)
            .field("series", &self.series.len())
            .field("sampling", &self.sampling.is_running())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MetricSample;
    use assert_matches::assert_matches;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSampler;

    impl SystemSampler for FixedSampler {
        fn sample(&self) -> Result<Vec<MetricSample>> {
            Ok(vec![
                MetricSample::new("cpu_usage", 42.0),
                MetricSample::new("memory_usage", 512.0).with_label("pid", "1"),
                MetricSample::new("not_registered", 1.0),
            ])
        }
    }

    struct FailingSampler {
        calls: AtomicUsize,
    }

    impl SystemSampler for FailingSampler {
        fn sample(&self) -> Result<Vec<MetricSample>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Sampling("no /proc".into()))
        }
    }

    struct PanickingSampler;

    impl SystemSampler for PanickingSampler {
        fn sample(&self) -> Result<Vec<MetricSample>> {
            panic!("sampler bug")
        }
    }

    #[test]
    fn test_builtin_series_registered() {
        let store = MetricStore::in_memory();
        for (name, _, _) in BUILTIN_SERIES {
            assert!(store.has_series(name), "missing {}", name);
        }
        assert_eq!(store.series_names().len(), BUILTIN_SERIES.len());
    }

    #[test]
    fn test_record_unknown_metric_is_noop() {
        let store = MetricStore::in_memory();
        let err = store.record("gpu_usage", 1.0).unwrap_err();
        assert_matches!(err, Error::UnknownMetric(name) if name == "gpu_usage");
        assert!(!store.has_series("gpu_usage"));
    }

    #[test]
    fn test_record_rejects_nan() {
        let store = MetricStore::in_memory();
        assert_matches!(
            store.record("cpu_usage", f64::NAN),
            Err(Error::InvalidValue { .. })
        );
        assert_eq!(store.len("cpu_usage"), Some(0));
    }

    #[test]
    fn test_bounded_series_keeps_last_points() {
        let store = MetricStore::new(5, Notifier::disabled());
        for i in 0..12 {
            store.record("cpu_usage", i as f64).unwrap();
        }

        assert_eq!(store.len("cpu_usage"), Some(5));
        let values: Vec<f64> = store
            .query_recent("cpu_usage", Duration::from_secs(3600))
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_query_recent_window() {
        let store = MetricStore::in_memory();
        let now = Utc::now();

        store
            .record_at("cpu_usage", 1.0, BTreeMap::new(), now - ChronoDuration::minutes(10))
            .unwrap();
        store
            .record_at("cpu_usage", 2.0, BTreeMap::new(), now - ChronoDuration::minutes(5))
            .unwrap();
        store
            .record_at("cpu_usage", 3.0, BTreeMap::new(), now - ChronoDuration::minutes(1))
            .unwrap();

        let points = store.query_recent_at("cpu_usage", Duration::from_secs(300), now);
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[test]
    fn test_query_result_is_a_snapshot() {
        let store = MetricStore::in_memory();
        let now = Utc::now();
        store
            .record_at("cpu_usage", 10.0, BTreeMap::new(), now)
            .unwrap();

        let before = store.query_recent_at("cpu_usage", Duration::from_secs(60), now);
        store
            .record_at("cpu_usage", 20.0, BTreeMap::new(), now + ChronoDuration::seconds(1))
            .unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].value, 10.0);
    }

    #[test]
    fn test_average_and_max_no_data() {
        let store = MetricStore::in_memory();
        assert_eq!(store.average("cpu_usage", Duration::from_secs(60)), None);
        assert_eq!(store.max("cpu_usage", Duration::from_secs(60)), None);
        assert_eq!(store.average("unknown", Duration::from_secs(60)), None);
    }

    #[test]
    fn test_average_max_min() {
        let store = MetricStore::in_memory();
        for v in [10.0, 20.0, 60.0] {
            store.record("api_response_time", v).unwrap();
        }

        let now = Utc::now();
        let window = Duration::from_secs(60);
        assert_eq!(store.average_at("api_response_time", window, now), Some(30.0));
        assert_eq!(store.max_at("api_response_time", window, now), Some(60.0));
        assert_eq!(store.min_at("api_response_time", window, now), Some(10.0));
        assert_eq!(store.sum_at("api_response_time", window, now), Some(90.0));
    }

    #[test]
    fn test_zero_is_not_no_data() {
        let store = MetricStore::in_memory();
        store.record("api_errors_total", 0.0).unwrap();
        assert_eq!(
            store.average("api_errors_total", Duration::from_secs(60)),
            Some(0.0)
        );
    }

    #[test]
    fn test_register_custom_series() {
        let store = MetricStore::in_memory();
        assert!(store.register_series("queue_depth", "count", "Pending jobs"));
        assert!(!store.register_series("queue_depth", "count", "Pending jobs"));
        store.record("queue_depth", 3.0).unwrap();
        assert_eq!(store.latest("queue_depth").map(|p| p.value), Some(3.0));
    }

    #[test]
    fn test_concurrent_registration_has_one_winner() {
        let store = Arc::new(MetricStore::in_memory());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.register_series("jobs_running", "count", ""))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|registered| *registered)
            .count();

        assert_eq!(winners, 1);
        assert!(store.has_series("jobs_running"));
    }

    #[test]
    fn test_summary() {
        let store = MetricStore::in_memory();
        store.record("cpu_usage", 40.0).unwrap();
        store.record("cpu_usage", 60.0).unwrap();

        let summary = store
            .summary_at("cpu_usage", Duration::from_secs(60), Utc::now())
            .unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.unit, "%");
        assert_eq!(summary.latest, Some(60.0));
        assert_eq!(summary.average, Some(50.0));

        let empty = store
            .summary_at("disk_usage", Duration::from_secs(60), Utc::now())
            .unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.average.is_none());
    }

    #[test]
    fn test_record_publishes_notification() {
        let (notifier, mut rx) = Notifier::channel(8);
        let store = MetricStore::new(10, notifier);

        store.record("messages_processed", 1.0).unwrap();

        let n = rx.try_recv().unwrap();
        assert_eq!(n.category, NotificationCategory::MetricRecorded);
        assert_eq!(n.payload["metric"], "messages_processed");
    }

    #[test]
    fn test_sample_once() {
        let store = MetricStore::in_memory();
        let recorded = store.sample_once(&FixedSampler);

        assert_eq!(recorded, 2);
        assert_eq!(store.latest("cpu_usage").map(|p| p.value), Some(42.0));
        let memory = store.latest("memory_usage").unwrap();
        assert_eq!(memory.labels.get("pid").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_sample_failures_are_contained() {
        let store = MetricStore::in_memory();
        let failing = FailingSampler {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(store.sample_once(&failing), 0);
        assert_eq!(store.sample_once(&PanickingSampler), 0);
        assert_eq!(store.len("cpu_usage"), Some(0));
    }

    #[tokio::test]
    async fn test_sampling_task_lifecycle() {
        let store = Arc::new(MetricStore::in_memory());

        assert!(store.start_sampling(Arc::new(FixedSampler), Duration::from_millis(10)));
        assert!(!store.start_sampling(Arc::new(FixedSampler), Duration::from_millis(10)));
        assert!(store.is_sampling());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.stop_sampling().await);
        assert!(!store.is_sampling());

        let count = store.len("cpu_usage").unwrap();
        assert!(count >= 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.len("cpu_usage"), Some(count));
    }

    #[tokio::test]
    async fn test_sampling_continues_after_failure() {
        let store = Arc::new(MetricStore::in_memory());
        let sampler = Arc::new(FailingSampler {
            calls: AtomicUsize::new(0),
        });

        store.start_sampling(sampler.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.stop_sampling().await;

        assert!(sampler.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_concurrent_records_respect_capacity() {
        let store = Arc::new(MetricStore::new(100, Notifier::disabled()));
        let mut handles = Vec::new();

        for worker in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..500 {
                    store.record("api_response_time", (worker * 1000 + i) as f64).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len("api_response_time"), Some(100));
    }
}

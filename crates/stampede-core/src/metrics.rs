// Metric sinks and the per-run registry
//
// Three sink variants, all append-only and safe under concurrent writers:
// - Counter: monotonic total
// - Rate: hits over total observations
// - Trend: latency samples with quantile queries
//
// Sinks are owned by a MetricsRegistry constructed per run; no metric state
// survives a run. Quantiles use linear interpolation by rank
// (rank = q/100 * (n-1), interpolated between the floor and ceil ranks),
// which is exact over the full sample set.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::outcome::{OutcomeCategory, RequestOutcome};

// ============================================================================
// Sinks
// ============================================================================

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Ratio of true observations over all observations
#[derive(Debug, Default)]
pub struct Rate {
    hits: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// hits / total, or 0.0 with no observations
    pub fn rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Unordered multiset of numeric samples with distributional queries
///
/// Writers append under a mutex held only for the push; readers clone the
/// sample set and compute outside the lock.
#[derive(Debug, Default)]
pub struct Trend {
    samples: Mutex<Vec<f64>>,
}

impl Trend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, value: f64) {
        self.samples.lock().unwrap().push(value);
    }

    pub fn count(&self) -> u64 {
        self.samples.lock().unwrap().len() as u64
    }

    /// Quantile q in [0, 100] by linear interpolation between ranks.
    /// Returns 0.0 with no samples.
    pub fn quantile(&self, q: f64) -> f64 {
        let mut samples = self.samples.lock().unwrap().clone();
        samples.sort_by(|a, b| a.total_cmp(b));
        quantile_of_sorted(&samples, q)
    }

    pub fn min(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        samples.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        samples.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn mean(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        }
    }

    pub fn median(&self) -> f64 {
        self.quantile(50.0)
    }

    /// All snapshot statistics from one sorted copy of the samples
    fn stats(&self) -> TrendStats {
        let mut samples = self.samples.lock().unwrap().clone();
        samples.sort_by(|a, b| a.total_cmp(b));

        if samples.is_empty() {
            return TrendStats::default();
        }
        TrendStats {
            count: samples.len() as u64,
            min: samples[0],
            max: samples[samples.len() - 1],
            mean: samples.iter().sum::<f64>() / samples.len() as f64,
            med: quantile_of_sorted(&samples, 50.0),
            p90: quantile_of_sorted(&samples, 90.0),
            p95: quantile_of_sorted(&samples, 95.0),
            p99: quantile_of_sorted(&samples, 99.0),
        }
    }
}

fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

// ============================================================================
// Registry
// ============================================================================

/// A named sink handle
#[derive(Debug, Clone)]
pub enum Sink {
    Counter(Arc<Counter>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

/// Per-run registry of uniquely named sinks
///
/// Handles are get-or-create: the first caller fixes the sink's type, and a
/// later request under the same name with a different type fails fast (a
/// programming error caught at setup, not at runtime under load).
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    sinks: RwLock<HashMap<String, Sink>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> Result<Arc<Counter>> {
        match self.get_or_insert(name, || Sink::Counter(Arc::new(Counter::new())))? {
            Sink::Counter(c) => Ok(c),
            _ => Err(EngineError::SinkTypeConflict(name.to_string())),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Arc<Rate>> {
        match self.get_or_insert(name, || Sink::Rate(Arc::new(Rate::new())))? {
            Sink::Rate(r) => Ok(r),
            _ => Err(EngineError::SinkTypeConflict(name.to_string())),
        }
    }

    pub fn trend(&self, name: &str) -> Result<Arc<Trend>> {
        match self.get_or_insert(name, || Sink::Trend(Arc::new(Trend::new())))? {
            Sink::Trend(t) => Ok(t),
            _ => Err(EngineError::SinkTypeConflict(name.to_string())),
        }
    }

    /// Look up an existing sink without creating one
    pub fn get(&self, name: &str) -> Option<Sink> {
        self.sinks.read().unwrap().get(name).cloned()
    }

    fn get_or_insert(&self, name: &str, make: impl FnOnce() -> Sink) -> Result<Sink> {
        if let Some(sink) = self.sinks.read().unwrap().get(name) {
            return Ok(sink.clone());
        }
        let mut sinks = self.sinks.write().unwrap();
        // re-check: another writer may have raced us between the locks
        let sink = sinks.entry(name.to_string()).or_insert_with(make);
        Ok(sink.clone())
    }

    /// Read-only snapshot of every sink's current value
    ///
    /// Reads each sink after releasing the registry lock, so writers are
    /// never blocked for more than the name-map clone.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let sinks: Vec<(String, Sink)> = self
            .sinks
            .read()
            .unwrap()
            .iter()
            .map(|(name, sink)| (name.clone(), sink.clone()))
            .collect();

        let mut metrics = BTreeMap::new();
        for (name, sink) in sinks {
            let value = match sink {
                Sink::Counter(c) => MetricValue::Counter { count: c.value() },
                Sink::Rate(r) => MetricValue::Rate {
                    rate: r.rate(),
                    hits: r.hits(),
                    total: r.total(),
                },
                Sink::Trend(t) => {
                    let stats = t.stats();
                    MetricValue::Trend {
                        count: stats.count,
                        min: stats.min,
                        max: stats.max,
                        mean: stats.mean,
                        med: stats.med,
                        p90: stats.p90,
                        p95: stats.p95,
                        p99: stats.p99,
                    }
                }
            };
            metrics.insert(name, value);
        }

        MetricsSnapshot { metrics }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TrendStats {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    med: f64,
    p90: f64,
    p95: f64,
    p99: f64,
}

/// Serializable value of one sink at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricValue {
    Counter {
        count: u64,
    },
    Rate {
        rate: f64,
        hits: u64,
        total: u64,
    },
    Trend {
        count: u64,
        min: f64,
        max: f64,
        mean: f64,
        med: f64,
        p90: f64,
        p95: f64,
        p99: f64,
    },
}

/// Immutable snapshot of all sinks, keyed by name
///
/// Serializes transparently as the name->value map; BTreeMap ordering keeps
/// the field order stable across runs so exports can be diffed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSnapshot {
    pub metrics: BTreeMap<String, MetricValue>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn counter_value(&self, name: &str) -> u64 {
        match self.metrics.get(name) {
            Some(MetricValue::Counter { count }) => *count,
            _ => 0,
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Pre-wired sink handles for one scenario's virtual users
///
/// All handles are resolved at scenario setup so the per-iteration record
/// path never touches the registry and cannot fail.
#[derive(Clone)]
pub struct Recorder {
    requests: Arc<Counter>,
    iterations: Arc<Counter>,
    cancelled: Arc<Counter>,
    errors: Arc<Rate>,
    latency: Arc<Trend>,
    category_counts: HashMap<OutcomeCategory, Arc<Counter>>,
    category_latency: HashMap<OutcomeCategory, Arc<Trend>>,
}

impl Recorder {
    pub fn new(registry: &MetricsRegistry, scenario: &str) -> Result<Self> {
        let mut category_counts = HashMap::new();
        let mut category_latency = HashMap::new();
        for category in OutcomeCategory::ALL {
            category_counts.insert(category, registry.counter(category.metric_name())?);
            category_latency.insert(category, registry.trend(category.latency_metric_name())?);
        }

        Ok(Self {
            requests: registry.counter("requests")?,
            iterations: registry.counter(&format!("iterations_{scenario}"))?,
            cancelled: registry.counter("cancelled_iterations")?,
            errors: registry.rate("errors")?,
            latency: registry.trend("latency")?,
            category_counts,
            category_latency,
        })
    }

    /// Record one classified outcome
    pub fn record(&self, category: OutcomeCategory, outcome: &RequestOutcome) {
        let latency_ms = outcome.latency.as_secs_f64() * 1000.0;

        self.requests.add(1);
        self.iterations.add(1);
        self.errors.add(category == OutcomeCategory::SystemError);
        self.latency.add(latency_ms);
        self.category_counts[&category].add(1);
        self.category_latency[&category].add(latency_ms);
    }

    /// Record an iteration abandoned by shutdown; the outcome itself is
    /// discarded, not misfiled as a system error
    pub fn record_cancelled(&self) {
        self.cancelled.add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn counter_accumulates() {
        let counter = Counter::new();
        counter.add(1);
        counter.add(41);
        assert_eq!(counter.value(), 42);
    }

    #[test]
    fn rate_is_hits_over_total() {
        let rate = Rate::new();
        for hit in [true, true, false, true] {
            rate.add(hit);
        }
        assert_eq!(rate.hits(), 3);
        assert_eq!(rate.total(), 4);
        assert!((rate.rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_rate_is_zero() {
        assert_eq!(Rate::new().rate(), 0.0);
    }

    #[test]
    fn trend_quantiles_interpolate_by_rank() {
        let trend = Trend::new();
        for v in [100.0, 200.0, 300.0, 400.0, 500.0] {
            trend.add(v);
        }
        assert_eq!(trend.quantile(50.0), 300.0);
        assert_eq!(trend.quantile(95.0), 480.0);
        assert_eq!(trend.quantile(0.0), 100.0);
        assert_eq!(trend.quantile(100.0), 500.0);
    }

    #[test]
    fn trend_ignores_insertion_order() {
        let trend = Trend::new();
        for v in [500.0, 100.0, 400.0, 200.0, 300.0] {
            trend.add(v);
        }
        assert_eq!(trend.median(), 300.0);
        assert_eq!(trend.min(), 100.0);
        assert_eq!(trend.max(), 500.0);
        assert_eq!(trend.mean(), 300.0);
    }

    #[test]
    fn trend_median_interpolates_even_counts() {
        let trend = Trend::new();
        for v in [100.0, 200.0, 300.0, 400.0] {
            trend.add(v);
        }
        assert_eq!(trend.median(), 250.0);
    }

    #[test]
    fn empty_trend_reads_zero() {
        let trend = Trend::new();
        assert_eq!(trend.count(), 0);
        assert_eq!(trend.quantile(95.0), 0.0);
        assert_eq!(trend.min(), 0.0);
        assert_eq!(trend.max(), 0.0);
        assert_eq!(trend.mean(), 0.0);
    }

    #[test]
    fn registry_reuses_handles_by_name() {
        let registry = MetricsRegistry::new();
        let a = registry.counter("requests").unwrap();
        let b = registry.counter("requests").unwrap();
        a.add(1);
        b.add(2);
        assert_eq!(registry.counter("requests").unwrap().value(), 3);
    }

    #[test]
    fn registry_rejects_type_conflicts() {
        let registry = MetricsRegistry::new();
        registry.counter("latency").unwrap();
        let err = registry.trend("latency").unwrap_err();
        assert!(matches!(err, EngineError::SinkTypeConflict(name) if name == "latency"));
    }

    #[test]
    fn snapshot_captures_all_sinks() {
        let registry = MetricsRegistry::new();
        registry.counter("requests").unwrap().add(10);
        registry.rate("errors").unwrap().add(false);
        let trend = registry.trend("latency").unwrap();
        trend.add(100.0);
        trend.add(200.0);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counter_value("requests"), 10);
        assert_eq!(
            snapshot.get("errors"),
            Some(&MetricValue::Rate {
                rate: 0.0,
                hits: 0,
                total: 1
            })
        );
        match snapshot.get("latency") {
            Some(MetricValue::Trend { count, mean, .. }) => {
                assert_eq!(*count, 2);
                assert_eq!(*mean, 150.0);
            }
            other => panic!("unexpected latency value: {other:?}"),
        }
    }

    #[test]
    fn snapshot_serializes_with_stable_names() {
        let registry = MetricsRegistry::new();
        registry.counter("requests").unwrap().add(1);
        registry.rate("errors").unwrap().add(true);

        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["requests"]["type"], "counter");
        assert_eq!(json["requests"]["count"], 1);
        assert_eq!(json["errors"]["type"], "rate");
    }

    #[test]
    fn concurrent_writers_lose_no_samples() {
        let registry = Arc::new(MetricsRegistry::new());
        let trend = registry.trend("latency").unwrap();
        let counter = registry.counter("requests").unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let trend = Arc::clone(&trend);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for i in 0..1000 {
                    trend.add(i as f64);
                    counter.add(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(trend.count(), 8000);
        assert_eq!(counter.value(), 8000);
    }

    #[test]
    fn recorder_files_outcomes_by_category() {
        let registry = MetricsRegistry::new();
        let recorder = Recorder::new(&registry, "load_test").unwrap();

        let ok = RequestOutcome::new(202, "", Duration::from_millis(20));
        let dup = RequestOutcome::new(409, "", Duration::from_millis(10));
        let boom = RequestOutcome::new(500, "", Duration::from_millis(90));

        recorder.record(OutcomeCategory::Success, &ok);
        recorder.record(OutcomeCategory::Success, &ok);
        recorder.record(OutcomeCategory::BizDuplicate, &dup);
        recorder.record(OutcomeCategory::SystemError, &boom);

        assert_eq!(registry.counter("requests").unwrap().value(), 4);
        assert_eq!(registry.counter("success").unwrap().value(), 2);
        assert_eq!(registry.counter("biz_duplicate").unwrap().value(), 1);
        assert_eq!(registry.counter("system_error").unwrap().value(), 1);
        assert_eq!(registry.counter("iterations_load_test").unwrap().value(), 4);
        assert!((registry.rate("errors").unwrap().rate() - 0.25).abs() < 1e-9);
        assert_eq!(registry.trend("latency_success").unwrap().count(), 2);
    }
}

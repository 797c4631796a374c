//! Metric registry — the source the exporter reads from.
//!
//! [`Registry`] is the contract the exporter needs: visit every metric
//! currently registered. [`MetricsRegistry`] is a ready-made in-memory
//! implementation with lock-free counters and gauges and a
//! mutex-protected sample set for histograms.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::metric::{Metric, MetricSnapshot, SampleSnapshot};

/// A collection of named metrics that can be walked by the exporter.
///
/// Implementations must tolerate `each` being called while other threads
/// update metric values.
pub trait Registry: Send + Sync {
    /// Invoke `f` once for every registered metric. Order is unspecified.
    fn each(&self, f: &mut dyn FnMut(&str, &dyn Metric));
}

/// Monotonic (but resettable) integer count.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Metric for Counter {
    fn snapshot(&self) -> Option<MetricSnapshot> {
        Some(MetricSnapshot::Counter(self.count()))
    }
}

/// Instantaneous integer value.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Gauge {
    fn snapshot(&self) -> Option<MetricSnapshot> {
        Some(MetricSnapshot::Gauge(self.value()))
    }
}

/// Instantaneous floating-point value, stored as raw `f64` bits.
#[derive(Debug, Default)]
pub struct GaugeFloat {
    bits: AtomicU64,
}

impl GaugeFloat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Metric for GaugeFloat {
    fn snapshot(&self) -> Option<MetricSnapshot> {
        Some(MetricSnapshot::GaugeFloat(self.value()))
    }
}

/// Distribution of recorded integer values.
///
/// Keeps every sample until [`Histogram::clear`] is called.
#[derive(Debug, Default)]
pub struct Histogram {
    samples: Mutex<Vec<i64>>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, value: i64) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    pub fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Copy the current samples into an immutable snapshot.
    pub fn sample(&self) -> SampleSnapshot {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        SampleSnapshot::new(samples.clone())
    }
}

impl Metric for Histogram {
    fn snapshot(&self) -> Option<MetricSnapshot> {
        Some(MetricSnapshot::Histogram(Arc::new(self.sample())))
    }
}

/// A registered entry. Typed variants let the helper accessors hand back
/// the concrete handle.
enum Entry {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    GaugeFloat(Arc<GaugeFloat>),
    Histogram(Arc<Histogram>),
    Other(Arc<dyn Metric>),
}

impl Entry {
    fn as_metric(&self) -> &dyn Metric {
        match self {
            Entry::Counter(m) => &**m,
            Entry::Gauge(m) => &**m,
            Entry::GaugeFloat(m) => &**m,
            Entry::Histogram(m) => &**m,
            Entry::Other(m) => &**m,
        }
    }

    fn to_metric(&self) -> Arc<dyn Metric> {
        match self {
            Entry::Counter(m) => m.clone(),
            Entry::Gauge(m) => m.clone(),
            Entry::GaugeFloat(m) => m.clone(),
            Entry::Histogram(m) => m.clone(),
            Entry::Other(m) => m.clone(),
        }
    }
}

/// In-memory registry: metric name → metric.
///
/// Iterates in name order. `each` holds a read lock for the duration of
/// the walk, so the visitor must not register or unregister metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: RwLock<BTreeMap<String, Entry>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an arbitrary metric, replacing any existing entry.
    pub fn register(&self, name: &str, metric: Arc<dyn Metric>) {
        self.insert(name, Entry::Other(metric));
    }

    /// Remove a metric. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            debug!(%name, "metric unregistered");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Metric>> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(Entry::to_metric)
    }

    pub fn len(&self) -> usize {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get or register a counter.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        self.get_or_insert(
            name,
            |e| match e {
                Entry::Counter(c) => Some(c.clone()),
                _ => None,
            },
            Entry::Counter,
        )
    }

    /// Get or register an integer gauge.
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        self.get_or_insert(
            name,
            |e| match e {
                Entry::Gauge(g) => Some(g.clone()),
                _ => None,
            },
            Entry::Gauge,
        )
    }

    /// Get or register a floating-point gauge.
    pub fn gauge_float(&self, name: &str) -> Arc<GaugeFloat> {
        self.get_or_insert(
            name,
            |e| match e {
                Entry::GaugeFloat(g) => Some(g.clone()),
                _ => None,
            },
            Entry::GaugeFloat,
        )
    }

    /// Get or register a histogram.
    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        self.get_or_insert(
            name,
            |e| match e {
                Entry::Histogram(h) => Some(h.clone()),
                _ => None,
            },
            Entry::Histogram,
        )
    }

    fn insert(&self, name: &str, entry: Entry) {
        let previous = self
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), entry);
        if previous.is_some() {
            debug!(%name, "metric replaced");
        } else {
            debug!(%name, "metric registered");
        }
    }

    /// Return the typed handle registered under `name`, or register a new
    /// one. A different kind already under that name is replaced.
    fn get_or_insert<T: Default>(
        &self,
        name: &str,
        extract: impl Fn(&Entry) -> Option<Arc<T>>,
        wrap: impl FnOnce(Arc<T>) -> Entry,
    ) -> Arc<T> {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = metrics.get(name) {
            if let Some(handle) = extract(existing) {
                return handle;
            }
            warn!(%name, "replacing metric of a different kind");
        }

        let handle = Arc::new(T::default());
        metrics.insert(name.to_string(), wrap(handle.clone()));
        debug!(%name, "metric registered");
        handle
    }
}

impl Registry for MetricsRegistry {
    fn each(&self, f: &mut dyn FnMut(&str, &dyn Metric)) {
        let metrics = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        for (name, entry) in metrics.iter() {
            f(name, entry.as_metric());
        }
    }
}

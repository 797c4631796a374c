//! Metric kinds and their point-in-time snapshots.
//!
//! The set of kinds the exporter understands is closed: every live metric
//! reduces to one [`MetricSnapshot`] variant, and the encoder matches on it
//! exhaustively. Anything else reports `None` from [`Metric::snapshot`] and
//! is skipped.

use std::fmt;
use std::sync::Arc;

/// A live metric that can be read by the exporter.
pub trait Metric: Send + Sync {
    /// Take a point-in-time snapshot, or `None` for kinds the exporter
    /// does not export.
    fn snapshot(&self) -> Option<MetricSnapshot>;
}

/// Distribution statistics exposed by histogram and timer snapshots.
pub trait Distribution: fmt::Debug + Send + Sync {
    fn count(&self) -> i64;
    fn min(&self) -> i64;
    fn max(&self) -> i64;
    fn mean(&self) -> f64;
    fn std_dev(&self) -> f64;

    /// Values at the given fractions (0.0..=1.0), in the same order.
    fn percentiles(&self, fractions: &[f64]) -> Vec<f64>;
}

/// Immutable view of one metric, taken at read time.
#[derive(Debug, Clone)]
pub enum MetricSnapshot {
    Counter(i64),
    Gauge(i64),
    GaugeFloat(f64),
    Histogram(Arc<dyn Distribution>),
    Meter(MeterSnapshot),
    Timer(TimerSnapshot),
}

/// Event count plus exponentially-weighted and mean rates (events/second).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterSnapshot {
    pub count: i64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    pub rate_mean: f64,
}

/// A distribution of raw durations (nanoseconds) together with the rate
/// at which they were recorded.
#[derive(Debug, Clone)]
pub struct TimerSnapshot {
    pub durations: Arc<dyn Distribution>,
    pub rate: MeterSnapshot,
}

impl TimerSnapshot {
    pub fn new(durations: impl Distribution + 'static, rate: MeterSnapshot) -> Self {
        Self {
            durations: Arc::new(durations),
            rate,
        }
    }
}

impl Metric for MeterSnapshot {
    fn snapshot(&self) -> Option<MetricSnapshot> {
        Some(MetricSnapshot::Meter(*self))
    }
}

impl Metric for TimerSnapshot {
    fn snapshot(&self) -> Option<MetricSnapshot> {
        Some(MetricSnapshot::Timer(self.clone()))
    }
}

/// A sorted, immutable sample set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSnapshot {
    sorted: Vec<i64>,
}

impl SampleSnapshot {
    pub fn new(mut samples: Vec<i64>) -> Self {
        samples.sort_unstable();
        Self { sorted: samples }
    }

    pub fn values(&self) -> &[i64] {
        &self.sorted
    }

    /// Value at a single fraction.
    ///
    /// Uses `pos = p * (n + 1)`, clamped to the extremes and linearly
    /// interpolated between neighbouring samples.
    pub fn percentile(&self, p: f64) -> f64 {
        let n = self.sorted.len();
        if n == 0 {
            return 0.0;
        }

        let pos = p * (n as f64 + 1.0);
        if pos < 1.0 {
            self.sorted[0] as f64
        } else if pos >= n as f64 {
            self.sorted[n - 1] as f64
        } else {
            let idx = pos as usize;
            let lower = self.sorted[idx - 1] as f64;
            let upper = self.sorted[idx] as f64;
            lower + (pos - pos.floor()) * (upper - lower)
        }
    }

    fn variance(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum: f64 = self
            .sorted
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum();
        sum / self.sorted.len() as f64
    }
}

impl Distribution for SampleSnapshot {
    fn count(&self) -> i64 {
        self.sorted.len() as i64
    }

    fn min(&self) -> i64 {
        self.sorted.first().copied().unwrap_or(0)
    }

    fn max(&self) -> i64 {
        self.sorted.last().copied().unwrap_or(0)
    }

    fn mean(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let sum: i128 = self.sorted.iter().map(|&v| v as i128).sum();
        sum as f64 / self.sorted.len() as f64
    }

    fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    fn percentiles(&self, fractions: &[f64]) -> Vec<f64> {
        fractions.iter().map(|&p| self.percentile(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_reports_zero() {
        let s = SampleSnapshot::default();
        assert_eq!(s.count(), 0);
        assert_eq!(s.min(), 0);
        assert_eq!(s.max(), 0);
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.std_dev(), 0.0);
        assert_eq!(s.percentiles(&[0.5, 0.99]), vec![0.0, 0.0]);
    }

    #[test]
    fn samples_are_sorted_on_construction() {
        let s = SampleSnapshot::new(vec![5, 1, 3]);
        assert_eq!(s.values(), &[1, 3, 5]);
        assert_eq!(s.min(), 1);
        assert_eq!(s.max(), 5);
    }

    #[test]
    fn mean_and_population_std_dev() {
        let s = SampleSnapshot::new(vec![2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(s.mean(), 5.0);
        assert_eq!(s.std_dev(), 2.0);
    }

    #[test]
    fn percentile_interpolates_between_samples() {
        // 1..=10: p50 → pos 5.5 → halfway between 5 and 6.
        let s = SampleSnapshot::new((1..=10).collect());
        assert_eq!(s.percentile(0.5), 5.5);
        assert_eq!(s.percentile(0.25), 2.75);
    }

    #[test]
    fn percentile_clamps_to_extremes() {
        let s = SampleSnapshot::new((1..=10).collect());
        // pos < 1 → min, pos >= n → max.
        assert_eq!(s.percentile(0.01), 1.0);
        assert_eq!(s.percentile(0.99), 10.0);
        assert_eq!(s.percentile(1.0), 10.0);
    }

    #[test]
    fn percentiles_keep_request_order() {
        let s = SampleSnapshot::new((1..=100).collect());
        let ps = s.percentiles(&[0.99, 0.5]);
        assert_eq!(ps.len(), 2);
        assert!(ps[0] > ps[1]);
    }

    #[test]
    fn static_snapshots_are_metrics() {
        let meter = MeterSnapshot {
            count: 3,
            ..Default::default()
        };
        assert!(matches!(meter.snapshot(), Some(MetricSnapshot::Meter(m)) if m.count == 3));

        let timer = TimerSnapshot::new(SampleSnapshot::new(vec![10]), meter);
        match timer.snapshot() {
            Some(MetricSnapshot::Timer(t)) => assert_eq!(t.durations.count(), 1),
            other => panic!("unexpected snapshot: {other:?}"),
        }
    }
}

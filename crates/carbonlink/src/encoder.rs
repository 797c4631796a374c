//! Graphite plaintext line encoding.
//!
//! Every metric becomes one or more lines of the form
//! `<prefix>.<name>[.<suffix>] <value> <timestamp>\n`. Field suffixes,
//! number formatting, and percentile key names are part of the wire
//! contract with existing dashboards. Histogram percentile lines keep the
//! historical `-precentile` spelling.

use std::fmt::{self, Write as _};

use crate::config::ExportConfig;
use crate::metric::{Distribution, MeterSnapshot, MetricSnapshot};
use crate::registry::Registry;

/// Render every metric in `registry` with a shared timestamp `now`
/// (Unix seconds). Metrics with no snapshot are skipped.
pub fn encode(registry: &dyn Registry, config: &ExportConfig, now: u64) -> String {
    let mut out = String::new();
    registry.each(&mut |name, metric| {
        if let Some(snapshot) = metric.snapshot() {
            encode_metric(&mut out, name, &snapshot, config, now);
        }
    });
    out
}

/// Append the lines for a single metric to `out`.
pub fn encode_metric(
    out: &mut String,
    name: &str,
    snapshot: &MetricSnapshot,
    config: &ExportConfig,
    now: u64,
) {
    let base = format!("{}.{}", config.prefix, name);

    match snapshot {
        MetricSnapshot::Counter(count) => push_line(out, &base, None, count, now),
        MetricSnapshot::Gauge(value) => push_line(out, &base, None, value, now),
        MetricSnapshot::GaugeFloat(value) => {
            push_line(out, &base, None, Fixed(*value, 6), now)
        }
        MetricSnapshot::Histogram(h) => {
            push_line(out, &base, Some("count"), h.count(), now);
            push_line(out, &base, Some("min"), h.min(), now);
            push_line(out, &base, Some("max"), h.max(), now);
            push_line(out, &base, Some("mean"), Fixed(h.mean(), 2), now);
            push_line(out, &base, Some("std-dev"), Fixed(h.std_dev(), 2), now);
            let values = h.percentiles(&config.percentiles);
            for (p, v) in config.percentiles.iter().zip(values) {
                let suffix = format!("{}-precentile", percentile_key(*p));
                push_line(out, &base, Some(&suffix), Fixed(v, 2), now);
            }
        }
        MetricSnapshot::Meter(m) => {
            push_line(out, &base, Some("count"), m.count, now);
            push_rates(out, &base, m, "mean", now);
        }
        MetricSnapshot::Timer(t) => {
            // A zero unit is rejected by validation; never divide by it here.
            let du = config.duration_divisor().max(1);
            let duf = du as f64;
            let d = &t.durations;

            push_line(out, &base, Some("count"), d.count(), now);
            push_line(out, &base, Some("min"), d.min() / du, now);
            push_line(out, &base, Some("max"), d.max() / du, now);
            push_line(out, &base, Some("mean"), Fixed(d.mean() / duf, 2), now);
            push_line(out, &base, Some("std-dev"), Fixed(d.std_dev() / duf, 2), now);
            let values = d.percentiles(&config.percentiles);
            for (p, v) in config.percentiles.iter().zip(values) {
                let suffix = format!("{}-percentile", percentile_key(*p));
                push_line(out, &base, Some(&suffix), Fixed(v / duf, 2), now);
            }
            push_rates(out, &base, &t.rate, "mean-rate", now);
        }
    }
}

/// Key used in percentile suffixes: `p * 100` in shortest decimal form
/// with the first `.` removed (0.5 → "50", 0.999 → "999").
pub fn percentile_key(p: f64) -> String {
    let scaled = (p * 100.0).to_string();
    scaled.replacen('.', "", 1)
}

fn push_rates(out: &mut String, base: &str, m: &MeterSnapshot, mean_suffix: &str, now: u64) {
    push_line(out, base, Some("one-minute"), Fixed(m.rate1, 2), now);
    push_line(out, base, Some("five-minute"), Fixed(m.rate5, 2), now);
    push_line(out, base, Some("fifteen-minute"), Fixed(m.rate15, 2), now);
    push_line(out, base, Some(mean_suffix), Fixed(m.rate_mean, 2), now);
}

/// Fixed-point float with the collector's tokens for non-finite values
/// (`+Inf`, `-Inf`, `NaN`).
struct Fixed(f64, usize);

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Fixed(value, precision) = *self;
        if value.is_nan() {
            f.write_str("NaN")
        } else if value == f64::INFINITY {
            f.write_str("+Inf")
        } else if value == f64::NEG_INFINITY {
            f.write_str("-Inf")
        } else {
            write!(f, "{value:.precision$}")
        }
    }
}

fn push_line(out: &mut String, base: &str, suffix: Option<&str>, value: impl fmt::Display, now: u64) {
    // Writing into a String cannot fail.
    let _ = match suffix {
        Some(suffix) => writeln!(out, "{base}.{suffix} {value} {now}"),
        None => writeln!(out, "{base} {value} {now}"),
    };
}

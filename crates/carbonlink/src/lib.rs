//! carbonlink — ship in-process metrics to a Graphite/carbon collector.
//!
//! Reads every metric in a [`Registry`], renders it into the plaintext
//! line protocol (`<name> <value> <timestamp>\n`), and pushes the lines
//! over a fresh TCP connection once per flush interval.
//!
//! # Architecture
//!
//! ```text
//! Exporter
//!   ├── run() / run_until() ← fixed-interval loop, logs and continues on failure
//!   └── once() → one cycle
//!         ├── capture timestamp
//!         ├── connect (bounded by connect_timeout)
//!         ├── encode() → Registry::each → one or more lines per metric
//!         └── write buffer (bounded by write_timeout), close
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> carbonlink::ExportResult<()> {
//! let registry = Arc::new(carbonlink::MetricsRegistry::new());
//! registry.counter("requests").inc(1);
//!
//! // Blocks forever, logging failed cycles.
//! carbonlink::graphite(registry, Duration::from_secs(10), "app", "127.0.0.1:2003").await
//! # }
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod exporter;
pub mod metric;
pub mod registry;

pub use config::{ExportConfig, FileConfig, DEFAULT_PERCENTILES};
pub use encoder::{encode, encode_metric, percentile_key};
pub use error::{ExportError, ExportResult};
pub use exporter::{graphite, graphite_once, graphite_with_config, CycleReport, Exporter};
pub use metric::{Distribution, MeterSnapshot, Metric, MetricSnapshot, SampleSnapshot, TimerSnapshot};
pub use registry::{Counter, Gauge, GaugeFloat, Histogram, MetricsRegistry, Registry};

//! Export configuration.
//!
//! [`ExportConfig`] is the immutable per-cycle configuration consumed by
//! the exporter. [`FileConfig`] is its TOML representation:
//!
//! ```toml
//! address = "graphite.internal:2003"
//! prefix = "myapp"
//! flush-interval = "10s"
//! duration-unit = "1ms"
//! percentiles = [0.5, 0.95, 0.99]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};

/// Percentiles exported when none are configured.
pub const DEFAULT_PERCENTILES: [f64; 5] = [0.5, 0.75, 0.95, 0.99, 0.999];

/// Connect timeout applied when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Write timeout applied when none is configured.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Collector address (`host:port`).
    pub address: String,
    /// Time between export cycles.
    pub flush_interval: Duration,
    /// Divisor for duration-valued timer fields. `1ns` reports raw nanoseconds.
    pub duration_unit: Duration,
    /// Prepended to every metric name, joined with `.`.
    pub prefix: String,
    /// Fractions (0.0..=1.0) reported for histograms and timers.
    pub percentiles: Vec<f64>,
    /// Upper bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Upper bound on writing one cycle's payload.
    pub write_timeout: Duration,
}

impl ExportConfig {
    /// Config with the default duration unit (nanoseconds), default
    /// percentiles, and 5s connect and write timeouts.
    pub fn new(address: impl Into<String>, flush_interval: Duration, prefix: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            flush_interval,
            duration_unit: Duration::from_nanos(1),
            prefix: prefix.into(),
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Builder method: set the duration unit.
    pub fn with_duration_unit(self, duration_unit: Duration) -> Self {
        Self {
            duration_unit,
            ..self
        }
    }

    /// Builder method: set the exported percentiles. An empty list
    /// omits percentile lines.
    pub fn with_percentiles(self, percentiles: Vec<f64>) -> Self {
        Self {
            percentiles,
            ..self
        }
    }

    /// Builder method: set the connect timeout.
    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// Builder method: set the write timeout.
    pub fn with_write_timeout(self, write_timeout: Duration) -> Self {
        Self {
            write_timeout,
            ..self
        }
    }

    /// Duration unit in nanoseconds, the divisor for timer fields.
    pub fn duration_divisor(&self) -> i64 {
        i64::try_from(self.duration_unit.as_nanos()).unwrap_or(i64::MAX)
    }

    pub fn validate(&self) -> ExportResult<()> {
        if self.address.trim().is_empty() {
            return Err(ExportError::InvalidConfig("address is empty".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(ExportError::InvalidConfig(
                "flush interval must be positive".into(),
            ));
        }
        if self.duration_unit.is_zero() {
            return Err(ExportError::InvalidConfig(
                "duration unit must be positive".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(ExportError::InvalidConfig(
                "timeouts must be positive".into(),
            ));
        }
        if let Some(p) = self
            .percentiles
            .iter()
            .find(|p| !(0.0..=1.0).contains(*p))
        {
            return Err(ExportError::InvalidConfig(format!(
                "percentile {p} is outside 0.0..=1.0"
            )));
        }
        Ok(())
    }
}

/// TOML representation of [`ExportConfig`]. Durations are strings such
/// as `"10s"`, `"500ms"`, `"1m"`, `"1us"`, or `"1ns"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub address: String,
    pub prefix: String,
    pub flush_interval: String,
    pub duration_unit: Option<String>,
    pub percentiles: Option<Vec<f64>>,
    pub connect_timeout: Option<String>,
    pub write_timeout: Option<String>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve defaults and validate.
    pub fn into_export_config(self) -> ExportResult<ExportConfig> {
        let mut config = ExportConfig::new(
            self.address,
            required_duration("flush-interval", &self.flush_interval)?,
            self.prefix,
        );
        if let Some(unit) = &self.duration_unit {
            config.duration_unit = required_duration("duration-unit", unit)?;
        }
        if let Some(percentiles) = self.percentiles {
            config.percentiles = percentiles;
        }
        if let Some(timeout) = &self.connect_timeout {
            config.connect_timeout = required_duration("connect-timeout", timeout)?;
        }
        if let Some(timeout) = &self.write_timeout {
            config.write_timeout = required_duration("write-timeout", timeout)?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn required_duration(field: &str, value: &str) -> ExportResult<Duration> {
    parse_duration(value).ok_or_else(|| {
        ExportError::InvalidConfig(format!("{field}: cannot parse duration {value:?}"))
    })
}

/// Parse a duration string like "10s", "500ms", "1m", "1us", "1ns".
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(n) = s.strip_suffix("ns") {
        n.parse::<u64>().ok().map(Duration::from_nanos)
    } else if let Some(n) = s.strip_suffix("us").or_else(|| s.strip_suffix("µs")) {
        n.parse::<u64>().ok().map(Duration::from_micros)
    } else if let Some(n) = s.strip_suffix("ms") {
        n.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(n) = s.strip_suffix('s') {
        n.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('m') {
        n.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('h') {
        n.parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

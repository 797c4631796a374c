//! Exporter — pushes registry contents to a Graphite collector.
//!
//! Each cycle opens a new TCP connection, writes every metric line with a
//! single shared timestamp, and closes the connection. The loop variants
//! log a failed cycle and try again on the next tick.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::encoder::encode;
use crate::error::{ExportError, ExportResult};
use crate::registry::Registry;

/// Outcome of a successful export cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Unix timestamp (seconds) stamped on every line.
    pub timestamp: u64,
    /// Lines written.
    pub lines: usize,
    /// Bytes written.
    pub bytes: usize,
}

/// Periodically exports a registry to a Graphite collector.
pub struct Exporter {
    registry: Arc<dyn Registry>,
    config: ExportConfig,
    /// Source of the per-cycle timestamp.
    clock: fn() -> u64,
}

impl Exporter {
    pub fn new(registry: Arc<dyn Registry>, config: ExportConfig) -> Self {
        Self {
            registry,
            config,
            clock: epoch_secs,
        }
    }

    /// Replace the wall clock (Unix seconds) used to stamp lines.
    pub fn with_clock(self, clock: fn() -> u64) -> Self {
        Self { clock, ..self }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run a single export cycle.
    ///
    /// Fails if the connection cannot be established within the connect
    /// timeout, or if the payload cannot be written within the write
    /// timeout. Nothing is written when the connection fails. An invalid
    /// config is rejected before connecting.
    pub async fn once(&self) -> ExportResult<CycleReport> {
        self.config.validate()?;
        let now = (self.clock)();
        let address = self.config.address.as_str();

        let mut stream = connect(address, self.config.connect_timeout).await?;

        let payload = encode(self.registry.as_ref(), &self.config, now);
        let report = CycleReport {
            timestamp: now,
            lines: payload.bytes().filter(|b| *b == b'\n').count(),
            bytes: payload.len(),
        };

        let write = async {
            stream.write_all(payload.as_bytes()).await?;
            stream.flush().await?;
            stream.shutdown().await
        };

        match tokio::time::timeout(self.config.write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ExportError::Write(e)),
            Err(_) => {
                return Err(ExportError::WriteTimeout {
                    timeout: self.config.write_timeout,
                });
            }
        }

        debug!(
            %address,
            lines = report.lines,
            bytes = report.bytes,
            "metrics exported"
        );
        Ok(report)
    }

    /// Export on every flush interval, forever.
    ///
    /// Returns only if the config is invalid. Failed cycles are logged
    /// and retried on the next tick.
    pub async fn run(&self) -> ExportResult<()> {
        self.config.validate()?;
        info!(
            address = %self.config.address,
            interval_ms = self.config.flush_interval.as_millis() as u64,
            "graphite exporter started"
        );

        let mut ticker = self.ticker();
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Like [`Exporter::run`], but stops when `shutdown` changes or its
    /// sender is dropped. A final cycle is attempted before returning.
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) -> ExportResult<()> {
        self.config.validate()?;
        info!(
            address = %self.config.address,
            interval_ms = self.config.flush_interval.as_millis() as u64,
            "graphite exporter started"
        );

        let mut ticker = self.ticker();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("graphite exporter shutting down");
                    // Final flush before exit.
                    self.tick().await;
                    break;
                }
            }
        }
        Ok(())
    }

    /// One cycle; failures are logged, never propagated.
    async fn tick(&self) {
        if let Err(e) = self.once().await {
            warn!(address = %self.config.address, error = %e, "graphite export failed");
        }
    }

    /// First tick one interval from now. A cycle that overruns makes the
    /// next tick fire immediately; cycles never overlap.
    fn ticker(&self) -> tokio::time::Interval {
        let period = self.config.flush_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// Export `registry` to `address` every `interval`, prefixing names with
/// `prefix`. Uses the default duration unit and percentiles.
pub async fn graphite(
    registry: Arc<dyn Registry>,
    interval: Duration,
    prefix: &str,
    address: &str,
) -> ExportResult<()> {
    graphite_with_config(registry, ExportConfig::new(address, interval, prefix)).await
}

/// Export `registry` forever using an explicit config.
pub async fn graphite_with_config(
    registry: Arc<dyn Registry>,
    config: ExportConfig,
) -> ExportResult<()> {
    Exporter::new(registry, config).run().await
}

/// Run exactly one export cycle, for callers with their own retry policy.
pub async fn graphite_once(
    registry: Arc<dyn Registry>,
    config: ExportConfig,
) -> ExportResult<CycleReport> {
    Exporter::new(registry, config).once().await
}

async fn connect(address: &str, timeout: Duration) -> ExportResult<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ExportError::Connect {
            address: address.to_string(),
            source,
        }),
        Err(_) => Err(ExportError::ConnectTimeout {
            address: address.to_string(),
            timeout,
        }),
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

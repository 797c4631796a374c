//! carbonlinkd — standalone Graphite exporter.
//!
//! Registers a handful of process metrics and pushes them to a carbon
//! collector on every flush interval until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! carbonlinkd --config /etc/carbonlink.toml
//! carbonlinkd --address graphite:2003 --prefix myhost --interval 10s
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use carbonlink::config::parse_duration;
use carbonlink::{Exporter, FileConfig, MetricsRegistry};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "carbonlinkd", about = "Push process metrics to a Graphite collector", version)]
struct Cli {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collector address (host:port). Overrides the config file.
    #[arg(long)]
    address: Option<String>,

    /// Metric name prefix. Overrides the config file.
    #[arg(long)]
    prefix: Option<String>,

    /// Flush interval, e.g. "10s". Overrides the config file.
    #[arg(long)]
    interval: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,carbonlink=debug,carbonlinkd=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let file = load_config(&cli)?;
    let config = file.into_export_config()?;

    let registry = Arc::new(MetricsRegistry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sampler = tokio::spawn(sample_process(registry.clone(), shutdown_rx.clone()));

    let exporter = Exporter::new(registry, config);
    let exporter_handle = tokio::spawn(async move { exporter.run_until(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    exporter_handle.await??;
    let _ = sampler.await;

    info!("carbonlinkd stopped");
    Ok(())
}

/// Merge the optional config file with command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<FileConfig> {
    let mut file = match &cli.config {
        Some(path) => FileConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => FileConfig {
            address: String::new(),
            prefix: "carbonlinkd".to_string(),
            flush_interval: "10s".to_string(),
            duration_unit: None,
            percentiles: None,
            connect_timeout: None,
            write_timeout: None,
        },
    };

    if let Some(address) = &cli.address {
        file.address = address.clone();
    }
    if let Some(prefix) = &cli.prefix {
        file.prefix = prefix.clone();
    }
    if let Some(interval) = &cli.interval {
        anyhow::ensure!(
            parse_duration(interval).is_some(),
            "invalid --interval {interval:?}"
        );
        file.flush_interval = interval.clone();
    }
    anyhow::ensure!(
        !file.address.is_empty(),
        "no collector address: pass --address or --config"
    );
    Ok(file)
}

/// Refresh process metrics once a second until shutdown.
async fn sample_process(registry: Arc<MetricsRegistry>, mut shutdown: watch::Receiver<bool>) {
    let started = Instant::now();
    let uptime = registry.gauge("process.uptime-seconds");
    let heartbeats = registry.counter("process.heartbeats");
    let tick_lag = registry.gauge("process.tick-lag-us");

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            scheduled = ticker.tick() => {
                let lag = tokio::time::Instant::now().saturating_duration_since(scheduled);
                tick_lag.update(lag.as_micros() as i64);
                uptime.update(started.elapsed().as_secs() as i64);
                heartbeats.inc(1);
            }
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_without_config_file() {
        let cli = Cli::parse_from([
            "carbonlinkd",
            "--address",
            "graphite:2003",
            "--interval",
            "30s",
        ]);
        let file = load_config(&cli).unwrap();

        assert_eq!(file.address, "graphite:2003");
        assert_eq!(file.prefix, "carbonlinkd");
        assert_eq!(file.flush_interval, "30s");
        assert!(file.into_export_config().is_ok());
    }

    #[test]
    fn address_is_required() {
        let cli = Cli::parse_from(["carbonlinkd"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn bad_interval_is_rejected() {
        let cli = Cli::parse_from(["carbonlinkd", "--address", "g:2003", "--interval", "later"]);
        assert!(load_config(&cli).is_err());
    }
}

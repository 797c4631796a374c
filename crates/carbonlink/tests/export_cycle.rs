//! End-to-end export tests against a local fake collector.

use std::sync::Arc;
use std::time::Duration;

use carbonlink::*;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

async fn fake_collector() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn receive(listener: &TcpListener) -> String {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut buf = String::new();
    socket.read_to_string(&mut buf).await.unwrap();
    buf
}

fn line_for<'a>(payload: &'a str, name: &str) -> &'a str {
    payload
        .lines()
        .find(|l| l.split(' ').next() == Some(name))
        .unwrap_or_else(|| panic!("no line for {name} in:\n{payload}"))
}

fn value_of(payload: &str, name: &str) -> String {
    line_for(payload, name).split(' ').nth(1).unwrap().to_string()
}

#[tokio::test]
async fn graphite_once_exports_every_kind() {
    let (listener, addr) = fake_collector().await;

    let registry = Arc::new(MetricsRegistry::new());
    registry.counter("jobs.done").inc(42);
    registry.gauge("jobs.queued").update(3);
    registry.gauge_float("load").update(0.75);
    let h = registry.histogram("payload.size");
    for v in 1..=10 {
        h.update(v);
    }
    registry.register(
        "hits",
        Arc::new(MeterSnapshot {
            count: 100,
            rate1: 1.5,
            rate5: 1.25,
            rate15: 1.0,
            rate_mean: 0.5,
        }),
    );

    let config = ExportConfig::new(addr, Duration::from_secs(10), "svc")
        .with_percentiles(vec![0.5, 0.999]);

    let (report, payload) = tokio::join!(
        graphite_once(registry.clone(), config),
        receive(&listener)
    );
    let report = report.unwrap();

    assert_eq!(report.lines, payload.lines().count());
    assert_eq!(report.bytes, payload.len());

    assert_eq!(value_of(&payload, "svc.jobs.done"), "42");
    assert_eq!(value_of(&payload, "svc.jobs.queued"), "3");
    assert_eq!(value_of(&payload, "svc.load"), "0.750000");

    assert_eq!(value_of(&payload, "svc.payload.size.count"), "10");
    assert_eq!(value_of(&payload, "svc.payload.size.min"), "1");
    assert_eq!(value_of(&payload, "svc.payload.size.max"), "10");
    assert_eq!(value_of(&payload, "svc.payload.size.mean"), "5.50");
    assert_eq!(value_of(&payload, "svc.payload.size.50-precentile"), "5.50");
    assert_eq!(value_of(&payload, "svc.payload.size.999-precentile"), "10.00");

    assert_eq!(value_of(&payload, "svc.hits.count"), "100");
    assert_eq!(value_of(&payload, "svc.hits.one-minute"), "1.50");
    assert_eq!(value_of(&payload, "svc.hits.mean"), "0.50");

    let stamps: Vec<&str> = payload.lines().map(|l| l.split(' ').nth(2).unwrap()).collect();
    assert!(stamps.iter().all(|s| *s == stamps[0]));
    assert_eq!(stamps[0], report.timestamp.to_string());
}

#[tokio::test]
async fn timer_fields_use_duration_unit() {
    let (listener, addr) = fake_collector().await;

    // Durations in nanoseconds: 1ms, 2ms, 3ms, 4ms.
    let durations = SampleSnapshot::new(vec![1_000_000, 2_000_000, 3_000_000, 4_000_000]);
    let rate = MeterSnapshot {
        count: 4,
        rate1: 0.25,
        rate5: 0.5,
        rate15: 0.75,
        rate_mean: 2.0,
    };

    let registry = Arc::new(MetricsRegistry::new());
    registry.register("query", Arc::new(TimerSnapshot::new(durations, rate)));

    let config = ExportConfig::new(addr, Duration::from_secs(10), "db")
        .with_duration_unit(Duration::from_millis(1))
        .with_percentiles(vec![0.5]);

    let (report, payload) = tokio::join!(graphite_once(registry, config), receive(&listener));
    report.unwrap();

    assert_eq!(value_of(&payload, "db.query.count"), "4");
    assert_eq!(value_of(&payload, "db.query.min"), "1");
    assert_eq!(value_of(&payload, "db.query.max"), "4");
    assert_eq!(value_of(&payload, "db.query.mean"), "2.50");
    assert_eq!(value_of(&payload, "db.query.50-percentile"), "2.50");

    // Rates are not scaled.
    assert_eq!(value_of(&payload, "db.query.one-minute"), "0.25");
    assert_eq!(value_of(&payload, "db.query.five-minute"), "0.50");
    assert_eq!(value_of(&payload, "db.query.fifteen-minute"), "0.75");
    assert_eq!(value_of(&payload, "db.query.mean-rate"), "2.00");

    assert!(!payload.contains("precentile"));
}

#[tokio::test]
async fn graphite_once_reports_connection_failure() {
    let (listener, addr) = fake_collector().await;
    drop(listener);

    let registry = Arc::new(MetricsRegistry::new());
    registry.counter("c").inc(1);

    let config = ExportConfig::new(addr.clone(), Duration::from_secs(10), "svc");
    let err = graphite_once(registry, config).await.unwrap_err();

    match err {
        ExportError::Connect { address, .. } => assert_eq!(address, addr),
        other => panic!("expected connect error, got {other:?}"),
    }
}

#[tokio::test]
async fn file_config_drives_export() {
    let (listener, addr) = fake_collector().await;

    let file: FileConfig = toml::from_str(&format!(
        "address = \"{addr}\"\nprefix = \"from-file\"\nflush-interval = \"30s\"\n"
    ))
    .unwrap();
    let config = file.into_export_config().unwrap();

    let registry = Arc::new(MetricsRegistry::new());
    registry.counter("requests").inc(7);

    let (report, payload) = tokio::join!(graphite_once(registry, config), receive(&listener));
    let report = report.unwrap();

    assert_eq!(payload, format!("from-file.requests 7 {}\n", report.timestamp));
}

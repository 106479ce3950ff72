use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{service_fn, ServiceBuilder, ServiceExt};
use traffic_core::live::{ExecutionContext, MemoryLock, MemorySegment};
use traffic_core::{
    AggregateQuery, Bound, CallOutcome, CaptureSettings, ExclusionRule, Field,
    InMemoryAggregateStore, LiveRingBuffer, RequestArgs, RequestStart, ResponseMeta, TailFilter,
    TrafficConfig, TrafficMonitor,
};

fn monitor(settings: CaptureSettings) -> TrafficMonitor {
    let live = LiveRingBuffer::new(
        MemorySegment::new("web"),
        MemorySegment::new("cli"),
        MemoryLock::new(),
        ExecutionContext::Web,
    );
    TrafficMonitor::with_parts(
        TrafficConfig::default().with_site_id(1),
        settings,
        live,
        Arc::new(InMemoryAggregateStore::new()),
        |builder| builder,
    )
}

async fn wait_for_rows(monitor: &TrafficMonitor, expected: usize) -> Vec<traffic_core::AggregateRow> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let rows = monitor.aggregate_query(&AggregateQuery::new()).await;
        if rows.len() >= expected || Instant::now() > deadline {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn layer_records_inbound_requests() {
    let monitor = monitor(CaptureSettings {
        live: true,
        ..Default::default()
    });

    let app = service_fn(|_req: Request<()>| async {
        Ok::<_, Infallible>(
            Response::builder()
                .status(StatusCode::NOT_FOUND)
                .header("content-length", "9")
                .body(())
                .unwrap(),
        )
    });
    let service = ServiceBuilder::new().layer(monitor.layer()).service(app);

    let mut req = Request::builder()
        .method("GET")
        .uri("/missing/page")
        .header("host", "site.test")
        .header("x-real-ip", "198.51.100.20")
        .body(())
        .unwrap();
    req.extensions_mut()
        .insert("127.0.0.1:41000".parse::<SocketAddr>().unwrap());
    req.extensions_mut()
        .insert(RequestStart(Instant::now() - Duration::from_millis(25)));

    let response = service.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let rows = wait_for_rows(&monitor, 1).await;
    assert_eq!(rows.len(), 1);
    let key = &rows[0].key;
    assert_eq!(key.bound, Bound::Inbound);
    assert_eq!(key.id, "198.51.100.20");
    assert_eq!(key.authority, "site.test");
    assert_eq!(key.endpoint, "/missing/page");
    assert_eq!(key.code, 404);
    assert_eq!(key.site_id, 1);
    assert!(rows[0].latency_min >= 25);

    let batch = monitor.tail_read("0", Some(Bound::Inbound), None);
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.items[0].record.size, Some(9));
}

#[tokio::test]
async fn outbound_hooks_feed_statistics_and_tail() {
    let monitor = monitor(CaptureSettings {
        live: true,
        exclusions: vec![ExclusionRule::new(Field::Authority, "^telemetry\\.")],
        ..Default::default()
    });
    let interceptor = monitor.interceptor();
    let args = RequestArgs::new("POST").header("content-type", "application/json");

    for (url, status) in [
        ("https://api.example.com/v1/orders", 201),
        ("https://api.example.com/v1/orders", 201),
        ("https://telemetry.example.com/ingest", 202),
        ("https://cdn.other.org/lib.js", 999),
    ] {
        interceptor.outbound_start(url, &args);
        interceptor.outbound_complete(
            &CallOutcome::Response(ResponseMeta::new(status)),
            &args,
            url,
        );
    }
    interceptor.flush().await;

    let rows = monitor
        .aggregate_query(&AggregateQuery::new().bound(Bound::Outbound))
        .await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.id, "example.com");
    assert_eq!(rows[0].hit, 2);
    assert_eq!(rows[1].key.id, "other.org");
    assert_eq!(rows[1].key.code, 0);

    let filter = TailFilter::from_json(r#"{"id": "^other\\."}"#).unwrap();
    let batch = monitor.tail_read("0", None, Some(&filter));
    assert_eq!(batch.items.len(), 1);
    let everything = monitor.tail_read("0", None, None);
    assert_eq!(batch.index, everything.index);
    assert_eq!(everything.items.len(), 3);
}

#[tokio::test]
async fn monitor_opens_file_backed_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrafficConfig::default().with_data_dir(dir.path());
    CaptureSettings {
        live: true,
        ..Default::default()
    }
    .save(&config.settings_path())
    .unwrap();

    let monitor = TrafficMonitor::open(config, ExecutionContext::Cli).await.unwrap();
    assert!(monitor.settings().settings.live);

    let interceptor = monitor.interceptor();
    interceptor.inbound_complete(
        &CallOutcome::Response(ResponseMeta::new(200)),
        &RequestArgs::new("GET"),
        "https://site.test/",
    );
    interceptor.flush().await;

    assert!(dir.path().join("traffic.db").exists());
    assert!(dir.path().join("live-cli.json").exists());
    assert_eq!(monitor.tail_read("0", None, None).items.len(), 1);
    assert_eq!(monitor.aggregate_query(&AggregateQuery::new()).await.len(), 1);
}

#[tokio::test]
async fn live_toggle_reaches_a_running_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrafficConfig::default()
        .with_data_dir(dir.path())
        .with_settings_refresh(Duration::ZERO);
    let monitor = TrafficMonitor::open(config.clone(), ExecutionContext::Web)
        .await
        .unwrap();
    let interceptor = monitor.interceptor();
    let ok = CallOutcome::Response(ResponseMeta::new(200));
    let args = RequestArgs::new("GET");

    interceptor.inbound_complete(&ok, &args, "https://site.test/before");
    assert!(!interceptor.live_enabled());
    assert!(monitor.tail_read("0", None, None).items.is_empty());

    // Same write the `traffic live enable` command does.
    let mut settings = CaptureSettings::load(&config.settings_path()).unwrap();
    settings.live = true;
    settings.save(&config.settings_path()).unwrap();

    interceptor.inbound_complete(&ok, &args, "https://site.test/during");
    assert!(interceptor.live_enabled());
    let batch = monitor.tail_read("0", None, None);
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.items[0].record.endpoint, "/during");

    settings.live = false;
    settings.save(&config.settings_path()).unwrap();

    interceptor.inbound_complete(&ok, &args, "https://site.test/after");
    assert!(!interceptor.live_enabled());
    assert_eq!(monitor.tail_read("0", None, None).items.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn outbound_call_outside_a_request_reaches_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrafficConfig::default().with_data_dir(dir.path());
    let monitor = TrafficMonitor::open(config, ExecutionContext::Cli)
        .await
        .unwrap();
    let interceptor = monitor.interceptor();

    // A background job on a plain thread, with no runtime of its own.
    let hooks = interceptor.clone();
    std::thread::spawn(move || {
        let args = RequestArgs::new("GET");
        let url = "https://api.example.com/v1/status";
        hooks.outbound_start(url, &args);
        hooks.outbound_complete(&CallOutcome::Response(ResponseMeta::new(200)), &args, url);
    })
    .join()
    .unwrap();

    let rows = wait_for_rows(&monitor, 1).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key.bound, Bound::Outbound);
    assert_eq!(rows[0].key.id, "example.com");
    assert_eq!(interceptor.aggregator().pending(), 0);
}

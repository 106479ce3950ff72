use assert_cmd::Command;
use std::path::Path;
use traffic_core::live::{ExecutionContext, LiveKey, LiveRingBuffer};
use traffic_core::{
    AggregateStore, Bound, CaptureSettings, EventRecord, SqliteAggregateStore, TrafficConfig,
};

fn traffic(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("traffic").unwrap();
    cmd.current_dir(data_dir)
        .env("TRAFFIC_DATA_DIR", data_dir)
        .env_remove("TRAFFIC_DATABASE_URL")
        .env_remove("TRAFFIC_LIVE_CAPACITY")
        .env_remove("TRAFFIC_LOCK_TIMEOUT_MS")
        .env_remove("TRAFFIC_STATS_TABLE")
        .env_remove("TRAFFIC_SITE_ID")
        .env_remove("TRAFFIC_SETTINGS_REFRESH_MS")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn settings(data_dir: &Path) -> CaptureSettings {
    CaptureSettings::load(&data_dir.join("settings.json")).unwrap()
}

#[test]
fn capture_toggles_are_persisted() {
    let dir = tempfile::tempdir().unwrap();

    traffic(dir.path())
        .args(["capture", "disable", "outbound"])
        .assert()
        .success();
    let saved = settings(dir.path());
    assert!(saved.inbound);
    assert!(!saved.outbound);

    traffic(dir.path())
        .args(["capture", "disable", "both"])
        .assert()
        .success();
    traffic(dir.path())
        .args(["capture", "enable", "inbound"])
        .assert()
        .success();
    let saved = settings(dir.path());
    assert!(saved.inbound);
    assert!(!saved.outbound);

    traffic(dir.path())
        .args(["capture", "enable", "sideways"])
        .assert()
        .code(2);
}

#[test]
fn live_toggle_and_status() {
    let dir = tempfile::tempdir().unwrap();

    traffic(dir.path()).args(["live", "enable"]).assert().success();
    assert!(settings(dir.path()).live);

    let output = traffic(dir.path()).arg("status").output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("live"));
    assert!(text.contains("0/4000 entries"));

    traffic(dir.path()).args(["live", "disable"]).assert().success();
    assert!(!settings(dir.path()).live);
}

#[test]
fn codes_list_reference_tables() {
    let dir = tempfile::tempdir().unwrap();

    let output = traffic(dir.path()).args(["codes", "http"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("404 Not Found"));

    let output = traffic(dir.path()).args(["codes", "exit"]).output().unwrap();
    let text = stdout(&output);
    assert!(text.contains("3 Statistics store unavailable"));
    assert!(text.contains("4 Configuration error"));
}

#[test]
fn tail_once_prints_buffered_calls() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = LiveRingBuffer::open(dir.path(), ExecutionContext::Web);
    buffer
        .publish_keyed(
            LiveKey::parse("20240101120000000001").unwrap(),
            &EventRecord::new(Bound::Outbound)
                .with_authority("api.example.com")
                .with_endpoint("/v1")
                .with_code(200),
        )
        .unwrap();
    buffer
        .publish_keyed(
            LiveKey::parse("20240101120000000002").unwrap(),
            &EventRecord::new(Bound::Inbound)
                .with_authority("site.test")
                .with_endpoint("/missing")
                .with_code(404),
        )
        .unwrap();

    let output = traffic(dir.path())
        .args(["tail", "--once", "--col", "120"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("api.example.com/v1"));
    assert!(lines[1].contains("site.test/missing"));

    let output = traffic(dir.path())
        .args(["tail", "--once", "--direction", "inbound"])
        .output()
        .unwrap();
    let text = stdout(&output);
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains(" 404 "));

    let output = traffic(dir.path())
        .args(["tail", "--once", "--filter", r#"{"authority": "^api\\."}"#])
        .output()
        .unwrap();
    assert_eq!(stdout(&output).lines().count(), 1);
}

#[test]
fn bad_filter_is_an_invalid_argument() {
    let dir = tempfile::tempdir().unwrap();
    traffic(dir.path())
        .args(["tail", "--once", "--filter", "not json"])
        .assert()
        .code(2);
    traffic(dir.path())
        .args(["tail", "--once", "--filter", r#"{"endpoint": "("}"#])
        .assert()
        .code(2);
}

#[test]
fn bad_configuration_exits_with_config_status() {
    let dir = tempfile::tempdir().unwrap();
    traffic(dir.path())
        .env("TRAFFIC_LIVE_CAPACITY", "0")
        .arg("status")
        .assert()
        .code(4);
}

#[test]
fn stats_reads_merged_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrafficConfig::default().with_data_dir(dir.path());

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let store = SqliteAggregateStore::connect(&config.database_url(), &config.stats_table)
            .await
            .unwrap();
        let record = EventRecord::new(Bound::Outbound)
            .with_id("example.com")
            .with_authority("api.example.com")
            .with_endpoint("/v1")
            .with_code(200);
        store.merge(&record.clone().with_latency(10)).await.unwrap();
        store.merge(&record.with_latency(30)).await.unwrap();
        store.pool().close().await;
    });

    let output = traffic(dir.path())
        .args(["stats", "--direction", "outbound"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("api.example.com/v1"));
    assert!(text.contains("10/20/30"));

    let output = traffic(dir.path())
        .args(["stats", "--direction", "inbound"])
        .output()
        .unwrap();
    assert!(stdout(&output).contains("No statistics recorded"));

    traffic(dir.path())
        .args(["stats", "--from", "01/02/2024"])
        .assert()
        .code(2);
}

#[test]
fn unreachable_store_exits_with_store_status() {
    let dir = tempfile::tempdir().unwrap();
    traffic(dir.path())
        .env(
            "TRAFFIC_DATABASE_URL",
            format!("sqlite://{}/missing/traffic.db", dir.path().display()),
        )
        .arg("stats")
        .assert()
        .code(3);
}

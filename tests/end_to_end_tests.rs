//! Whole tailer against a capture server: parse, cursor, batching and
//! shutdown wired together through the run entry point.

mod common;

use chrono::{TimeZone, Utc};
use common::CaptureServer;
use logtap::cli::run::{run_with_config, RunError};
use logtap::config::{parse_config, Config};
use logtap::source::Entry;
use tempfile::TempDir;
use tokio::sync::oneshot;

fn entry(seq_num: u64, second: u32, description: &str) -> Entry {
    Entry {
        seq_num,
        time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, second).unwrap(),
        code: 0x1F,
        class: 4,
        locale: 0x409,
        event_description: description.to_string(),
        event_data: format!("payload {seq_num}"),
    }
}

fn render(entries: &[Entry]) -> String {
    let body = entries
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Event log export\n{body}")
}

fn config(dir: &TempDir, server: &CaptureServer) -> Config {
    let yaml = format!(
        r#"
source:
  path: {source}
  interval: 50ms
  start_time: "2024-01-01 00:00:00"
  utc_offset: "+00:00"
cursor:
  path: {cursor}
dispatch:
  push_url: {url}
  labels:
    job: logtap-e2e
  batch_wait: 50ms
  batch_size: 100
  push_origin_ts: true
"#,
        source = dir.path().join("export.txt").display(),
        cursor = dir.path().join(".pos.dat").display(),
        url = server.push_url(),
    );
    parse_config(&yaml).unwrap()
}

fn write_export(dir: &TempDir, entries: &[Entry]) {
    std::fs::write(dir.path().join("export.txt"), render(entries)).unwrap();
}

fn read_cursor(dir: &TempDir) -> String {
    std::fs::read_to_string(dir.path().join(".pos.dat")).unwrap()
}

/// Spawn the tailer; dropping or firing the returned sender stops it.
fn spawn_tailer(
    config: Config,
) -> (
    oneshot::Sender<()>,
    tokio::task::JoinHandle<Result<(), RunError>>,
) {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(run_with_config(config, async move {
        let _ = stop_rx.await;
    }));
    (stop_tx, handle)
}

#[tokio::test]
async fn test_forwards_new_records_and_resumes_from_cursor() {
    let dir = TempDir::new().unwrap();
    let server = CaptureServer::start().await;
    let first = entry(1, 0, "Service started");
    let second = entry(2, 5, "Service stopped");
    write_export(&dir, &[first.clone(), second.clone()]);

    let (stop, handle) = spawn_tailer(config(&dir, &server));

    let values = server.wait_for_values(2).await;
    assert_eq!(
        values,
        vec![
            (
                first.time.timestamp_nanos_opt().unwrap().to_string(),
                "Service started\npayload 1".to_string()
            ),
            (
                second.time.timestamp_nanos_opt().unwrap().to_string(),
                "Service stopped\npayload 2".to_string()
            ),
        ]
    );

    // The export grows; only the new record goes out.
    let third = entry(3, 9, "Disk full");
    write_export(&dir, &[first.clone(), second.clone(), third.clone()]);
    let values = server.wait_for_values(3).await;
    assert_eq!(values[2].1, "Disk full\npayload 3");

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(read_cursor(&dir), "2024-01-02T03:04:09Z\n3");
    let pushes = server.received();
    assert!(pushes
        .iter()
        .all(|p| p.body["streams"][0]["stream"]["job"] == "logtap-e2e"));
    let metadata = &pushes.last().unwrap().body["streams"][0]["values"][0][2];
    assert_eq!(metadata["seq_num"], "3");
    assert_eq!(metadata["locale"], "1033");

    // A restart picks up after the saved cursor.
    let fourth = entry(4, 12, "Disk cleaned");
    write_export(&dir, &[first, second, third, fourth]);
    let (stop, handle) = spawn_tailer(config(&dir, &server));

    let values = server.wait_for_values(4).await;
    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // Had anything before the cursor been re-sent it would sit at index 3.
    assert_eq!(values[3].1, "Disk cleaned\npayload 4");
    assert_eq!(server.values().len(), 4);
    assert_eq!(read_cursor(&dir), "2024-01-02T03:04:12Z\n4");
}

#[tokio::test]
async fn test_bad_field_stops_tailer_and_keeps_cursor() {
    let dir = TempDir::new().unwrap();
    let server = CaptureServer::start().await;
    let good = entry(1, 0, "fine").to_string();
    let bad = entry(2, 1, "broken")
        .to_string()
        .replacen("Locale: 0x409", "Locale: 0xG09", 1);
    std::fs::write(
        dir.path().join("export.txt"),
        format!("{good}\n\n{bad}"),
    )
    .unwrap();

    let (_stop, handle) = spawn_tailer(config(&dir, &server));
    let err = handle.await.unwrap().unwrap_err();

    assert!(matches!(err, RunError::Poll(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(server.values().is_empty());
    // Nothing parsed, so the start-time floor is what gets saved.
    assert_eq!(read_cursor(&dir), "2024-01-01T00:00:00Z\n0");
}

#[tokio::test]
async fn test_malformed_cursor_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let server = CaptureServer::start().await;
    write_export(&dir, &[entry(1, 0, "never sent")]);
    std::fs::write(dir.path().join(".pos.dat"), "one line only").unwrap();

    let (_stop, handle) = spawn_tailer(config(&dir, &server));
    let err = handle.await.unwrap().unwrap_err();

    assert!(matches!(err, RunError::Cursor(_)));
    assert!(server.values().is_empty());
    assert_eq!(read_cursor(&dir), "one line only");
}

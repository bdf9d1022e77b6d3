//! End-to-end runs of the HTTP provider against a local mock server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use speedwatch_measure::{HttpProvider, HttpProviderConfig, Orchestrator, Stage};
use speedwatch_storage::{CsvRecordStore, RecordStore, Status};
use tempfile::TempDir;

/// Starts a mock measurement service and returns its port.
fn spawn_mock() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || handle(stream, port));
        }
    });
    port
}

fn handle(stream: TcpStream, port: u16) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }

    let mut content_length = 0usize;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end().to_ascii_lowercase();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        if line.starts_with("transfer-encoding:") && line.contains("chunked") {
            chunked = true;
        }
    }

    // Drain the request body before answering.
    if chunked {
        loop {
            let mut size_line = String::new();
            if reader.read_line(&mut size_line).unwrap_or(0) == 0 {
                return;
            }
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
            let mut chunk = vec![0u8; size + 2];
            if reader.read_exact(&mut chunk).is_err() || size == 0 {
                break;
            }
        }
    } else {
        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            return;
        }
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let path = target.split('?').next().unwrap_or(target);
    let (status, body): (&str, Vec<u8>) = match path {
        "/config" => (
            "200 OK",
            br#"{"client":{"ip":"127.0.0.1","isp":"Loopback"}}"#.to_vec(),
        ),
        "/forbidden" => ("403 Forbidden", b"blocked".to_vec()),
        "/servers" => (
            "200 OK",
            format!(
                r#"[{{"id":"1","url":"http://127.0.0.1:{port}/near/upload.php","name":"Near",
                     "country":"Localland","sponsor":"Mock Near","distance":1.5}},
                    {{"id":"2","url":"http://127.0.0.1:{port}/dead/upload.php","name":"Dead",
                     "country":"Localland","sponsor":"Mock Dead","distance":0.5}}]"#
            )
            .into_bytes(),
        ),
        "/empty-servers" => ("200 OK", b"[]".to_vec()),
        "/near/latency.txt" => ("200 OK", b"test=test".to_vec()),
        "/near/upload.php" => ("200 OK", b"size=ok".to_vec()),
        p if p.starts_with("/near/random") => ("200 OK", vec![b'x'; 64 * 1024]),
        _ => ("404 Not Found", b"missing".to_vec()),
    };

    let mut stream = stream;
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

fn provider(port: u16, config_path: &str, servers_path: &str) -> HttpProvider {
    HttpProvider::new(HttpProviderConfig {
        config_url: format!("http://127.0.0.1:{port}{config_path}"),
        servers_url: format!("http://127.0.0.1:{port}{servers_path}"),
        download_sizes: vec![350, 500],
        upload_bytes: 32 * 1024,
        latency_samples: 2,
        timeout_secs: 5,
        max_candidates: 5,
    })
}

#[tokio::test]
async fn full_run_against_mock_server_records_success() {
    let port = spawn_mock();
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path().join("speed_history.csv"));
    let orch = Orchestrator::new(provider(port, "/config", "/servers"), store, 500);

    let report = orch.run().await.unwrap();
    assert!(report.succeeded(), "run failed: {:?}", report.failure);
    let record = &report.record;
    assert_eq!(record.status, Status::Success);
    assert_eq!(record.server_sponsor.as_deref(), Some("Mock Near"));
    assert!(record.download_mbps > 0.0);
    assert!(record.upload_mbps > 0.0);

    let stored: Vec<_> = orch
        .store()
        .read_all()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(stored, vec![record.clone()]);
}

#[tokio::test]
async fn forbidden_config_is_recorded_as_http_error() {
    let port = spawn_mock();
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path().join("speed_history.csv"));
    let orch = Orchestrator::new(provider(port, "/forbidden", "/servers"), store, 500);

    let report = orch.run().await.unwrap();
    let failure = report.failure.clone().unwrap();
    assert_eq!(failure.stage, Stage::GetConfig);
    assert_eq!(report.record.error_type.as_deref(), Some("SpeedtestHTTPError"));
    assert_eq!(
        report.record.error_details.as_deref(),
        Some("get_config: HTTP status 403")
    );
    assert_eq!(orch.store().stats().unwrap().failure_count, 1);
}

#[tokio::test]
async fn empty_server_list_fails_at_get_servers() {
    let port = spawn_mock();
    let dir = TempDir::new().unwrap();
    let store = CsvRecordStore::new(dir.path().join("speed_history.csv"));
    let orch = Orchestrator::new(provider(port, "/config", "/empty-servers"), store, 500);

    let report = orch.run().await.unwrap();
    let failure = report.failure.unwrap();
    assert_eq!(failure.stage, Stage::GetServers);
    assert_eq!(failure.error_type, "NoMatchedServers");
}

//! End-to-end tests: records in over HTTP, ordered rounds out over SSE.

use roundscope_core::EngineConfig;
use roundscope_server::{
    ApiServer, ApiServerConfig, AppState, ConsumerConfig, ControlState, IngestHub, ReplayLog,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn test_state() -> AppState {
    AppState::new(
        Arc::new(IngestHub::new(1024)),
        Arc::new(ControlState::new(7, None)),
        Arc::new(ReplayLog::new(1000)),
        None,
        EngineConfig {
            idle_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        },
        ConsumerConfig {
            batch_size: 64,
            poll_wait: Duration::from_millis(10),
        },
    )
}

async fn start_server(state: AppState) -> (SocketAddr, roundscope_server::ApiServerHandle) {
    let server = ApiServer::new(
        ApiServerConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        },
        state,
    );
    let handle = server.start().await.unwrap();
    handle.set_ready(true);
    (handle.local_addr(), handle)
}

/// Send one request on a fresh connection and return the whole response.
async fn http_request(addr: SocketAddr, request: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

async fn post(addr: SocketAddr, path: &str, body: &str) -> String {
    http_request(
        addr,
        format!(
            "POST {path} HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ),
    )
    .await
}

fn record(kind: &str, body: serde_json::Value) -> String {
    let mut message = body;
    message["kind"] = json!(kind);
    serde_json::to_string(&json!({
        "category": "message-event",
        "message": message,
    }))
    .unwrap()
}

/// Open the SSE stream and read until all expected substrings appear or the
/// deadline passes.
async fn read_sse_until(addr: SocketAddr, path: &str, expected: &[&str]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nhost: localhost\r\naccept: text/event-stream\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut collected = String::new();
    let mut buf = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if expected.iter().all(|needle| collected.contains(needle)) {
            return collected;
        }
        let read = tokio::time::timeout_at(deadline, stream.read(&mut buf)).await;
        match read {
            Ok(Ok(0)) | Err(_) => return collected,
            Ok(Ok(n)) => collected.push_str(&String::from_utf8_lossy(&buf[..n])),
            Ok(Err(_)) => return collected,
        }
    }
}

#[tokio::test]
async fn test_ingest_to_sse_round_trip() {
    let (addr, _server) = start_server(test_state()).await;

    // Attach the consumer first; the hub only delivers records published
    // after subscription.
    let reader = tokio::spawn(read_sse_until(
        addr,
        "/sse/events",
        &["SessionStart", "PrimaryElected", "PrePrepare", "\"Prepare\""],
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = post(addr, "/api/v1/control/session", "{}").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");

    let lines = format!(
        "{}\n{}\n",
        record("preprepare", json!({"order": 7, "rank": 1, "participant": 0})),
        record("prepare", json!({"order": 7, "participant": 1})),
    );
    let response = post(addr, "/ingest", &lines).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"published\":2"), "{response}");

    let stream = reader.await.unwrap();
    assert!(stream.contains("SessionStart"), "stream: {stream}");
    assert!(stream.contains("PrimaryElected"), "stream: {stream}");
    assert!(stream.contains("PrePrepare"), "stream: {stream}");
    assert!(stream.contains("Prepare"), "stream: {stream}");

    // Phase order holds in the emitted stream.
    let pp = stream.find("PrePrepare").unwrap();
    let prepare = stream.rfind("\"Prepare\"").unwrap();
    assert!(pp < prepare);
}

#[tokio::test]
async fn test_from_eid_replay_cursor() {
    let state = test_state();
    for eid in 1..=5u64 {
        state.replay.push(&roundscope_core::EmittedEvent {
            eid,
            json: format!("{{\"eid\":{eid},\"marker\":\"replayed-{eid}\"}}"),
        });
    }
    let (addr, _server) = start_server(state).await;

    let stream = read_sse_until(addr, "/sse/events?from_eid=4", &["replayed-5"]).await;
    assert!(!stream.contains("replayed-3"), "stream: {stream}");
    assert!(stream.contains("replayed-4"), "stream: {stream}");
    assert!(stream.contains("replayed-5"), "stream: {stream}");
}

#[tokio::test]
async fn test_new_consumer_sees_last_round() {
    let state = test_state();
    state.replay.set_last_round(&[roundscope_core::EmittedEvent {
        eid: 9,
        json: "{\"marker\":\"latest-round\"}".to_string(),
    }]);
    let (addr, _server) = start_server(state).await;

    let stream = read_sse_until(addr, "/sse/events", &["latest-round"]).await;
    assert!(stream.contains("latest-round"), "stream: {stream}");
    assert!(stream.contains("id: 9"), "stream: {stream}");
}

#[tokio::test]
async fn test_health_and_metrics_surface() {
    let (addr, _server) = start_server(test_state()).await;

    let health = http_request(
        addr,
        "GET /health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n".to_string(),
    )
    .await;
    assert!(health.starts_with("HTTP/1.1 200"), "{health}");
    assert!(health.contains("\"status\":\"ok\""), "{health}");

    let metrics = http_request(
        addr,
        "GET /metrics HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n".to_string(),
    )
    .await;
    assert!(metrics.starts_with("HTTP/1.1 200"), "{metrics}");
}

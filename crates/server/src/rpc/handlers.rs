//! Handler implementations for the HTTP API.

use super::state::AppState;
use crate::consumer::run_consumer;
use crate::metrics::metrics;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use prometheus::{Encoder, TextEncoder};
use roundscope_core::Engine;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// Handler for `/health` - liveness probe.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Handler for `/ready` - readiness probe.
///
/// Returns 200 OK once the server is accepting consumers, 503 before that.
pub async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not_ready",
                ready: false,
            }),
        )
    }
}

/// Handler for `/metrics` - Prometheus metrics in text format.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = ?e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }

    (
        [(
            axum::http::header::CONTENT_TYPE,
            encoder.format_type().to_string(),
        )],
        buffer,
    )
        .into_response()
}

/// Handler for `POST /ingest` - publish raw records to the hub.
///
/// The body is NDJSON: one record per non-empty line. Lines are published
/// as-is; noise filtering is the engine's job, not the ingest path's.
pub async fn ingest_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let mut published = 0usize;
    for line in body.split(|b| *b == b'\n') {
        let trimmed = line.strip_suffix(b"\r").unwrap_or(line);
        if trimmed.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        state.hub.publish(Bytes::copy_from_slice(trimmed));
        published += 1;
    }
    metrics().records_published.inc_by(published as f64);
    Json(IngestResponse { published })
}

/// Query parameters for the event stream.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Resumption cursor: replay retained events with `eid >= from_eid`
    /// before going live. Without it, the latest completed round is
    /// replayed.
    pub from_eid: Option<u64>,
}

/// Handler for `GET /sse/events` - the per-consumer event stream.
///
/// Each connection owns a fresh engine and a private hub subscription;
/// dropping the connection ends the consumer loop after an unconditional
/// drain.
pub async fn sse_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let initial = match params.from_eid {
        Some(cursor) => state.replay.since(cursor),
        None => state.replay.last_round(),
    };
    info!(
        replayed = initial.len(),
        from_eid = ?params.from_eid,
        "consumer attached"
    );

    let (tx, rx) = mpsc::channel(1024);
    let engine = Engine::new(state.engine_config.clone());
    let source = state.hub.subscribe();
    let control = state.control.clone();
    let replay = state.replay.clone();
    let debug_log = state.debug_log.clone();
    let consumer_config = state.consumer_config.clone();
    tokio::spawn(async move {
        if let Err(error) =
            run_consumer(source, engine, control, replay, debug_log, tx, consumer_config).await
        {
            warn!(%error, "consumer loop terminated");
        }
    });

    let live = ReceiverStream::new(rx);
    let events = stream::iter(initial)
        .chain(live)
        .map(|event| Ok(SseEvent::default().id(event.eid.to_string()).data(event.json)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Handler for `POST /api/v1/control/session` - start a new run.
///
/// The body is optional; when present it reconfigures the cluster before
/// the epoch advances.
pub async fn start_session_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> axum::response::Response {
    let request: StartSessionRequest = if body.is_empty() {
        StartSessionRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(error) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: error.to_string(),
                    }),
                )
                    .into_response();
            }
        }
    };

    let epoch = state
        .control
        .advance_epoch(request.replicas, request.fault_override);
    state.replay.clear();
    info!(epoch, "control epoch advanced");
    Json(SessionResponse { epoch }).into_response()
}

/// Handler for `PUT /api/v1/control/replicas` - reconfigure the cluster
/// size. Reconfiguration restarts the run, so the epoch advances too.
pub async fn set_replicas_handler(
    State(state): State<AppState>,
    Json(request): Json<SetReplicasRequest>,
) -> impl IntoResponse {
    let epoch = state.control.set_replica_count(request.count);
    state.replay.clear();
    info!(replicas = request.count, epoch, "replica count changed");
    Json(ReplicasResponse {
        replicas: request.count,
        epoch,
    })
}

/// Handler for `DELETE /api/v1/control/replay` - clear replay state.
pub async fn clear_replay_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.replay.clear();
    StatusCode::NO_CONTENT
}

/// Handler for `PUT /api/v1/control/request` - stash the next request
/// payload for the workload driver.
pub async fn set_request_handler(
    State(state): State<AppState>,
    Json(request): Json<SetRequestRequest>,
) -> impl IntoResponse {
    state.control.set_next_request(request.payload);
    StatusCode::OK
}

/// Handler for `GET /api/v1/control/request`.
pub async fn get_request_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(RequestResponse {
        payload: state.control.next_request(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Request / response types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

#[derive(Serialize)]
struct IngestResponse {
    published: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    pub replicas: Option<u32>,
    pub fault_override: Option<u32>,
}

#[derive(Serialize)]
struct SessionResponse {
    epoch: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetReplicasRequest {
    pub count: u32,
}

#[derive(Serialize)]
struct ReplicasResponse {
    replicas: u32,
    epoch: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetRequestRequest {
    pub payload: Option<String>,
}

#[derive(Serialize)]
struct RequestResponse {
    payload: Option<String>,
}

//! WebSocket progress streaming.
//!
//! Bridges the Redis pub/sub progress channel to operator WebSocket
//! connections. The current job record is sent as the first frame so
//! late subscribers see where the job already is.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use adgen_models::{JobId, JobRecord, ProgressMessage};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Interval between keepalive pings.
const PING_INTERVAL: Duration = Duration::from_secs(30);

static ACTIVE_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// `GET /api/jobs/{id}/ws` — upgrade to a progress stream.
///
/// Unknown jobs are rejected with 404 before the upgrade.
pub async fn job_progress_ws(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let record = state
        .status
        .get_record(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {job_id}")))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, job_id, record)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, job_id: String, record: JobRecord) {
    metrics::record_ws_connection();
    let active = ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed) + 1;
    metrics::set_ws_active_connections(active);
    info!(job_id, "WebSocket connected");

    stream_progress(&mut socket, &state, &job_id, record).await;

    let active = ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed) - 1;
    metrics::set_ws_active_connections(active);
    let _ = socket.close().await;
    info!(job_id, "WebSocket disconnected");
}

async fn stream_progress(
    socket: &mut WebSocket,
    state: &AppState,
    job_id: &str,
    record: JobRecord,
) {
    // Subscribe before sending the snapshot so no update falls in between.
    let mut updates = match state.progress.subscribe(&JobId::from_string(job_id)).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(job_id, error = %e, "Failed to subscribe to progress channel");
            let _ = socket
                .send(Message::Text("{\"type\":\"error\",\"message\":\"progress channel unavailable\"}".into()))
                .await;
            return;
        }
    };

    if let Ok(snapshot) = serde_json::to_string(&record) {
        if socket.send(Message::Text(snapshot)).await.is_err() {
            return;
        }
    }

    // A terminal record will never publish again; close after the snapshot.
    if record.is_terminal() {
        return;
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(message) = update else {
                    debug!(job_id, "Progress channel closed");
                    break;
                };

                let terminal = matches!(
                    message,
                    ProgressMessage::Done { .. } | ProgressMessage::Error { .. }
                );
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(job_id, error = %e, "Failed to serialize progress message");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
                metrics::record_ws_message_sent(message_type(&message));

                if terminal {
                    break;
                }
            }
            _ = ping.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(job_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }
}

fn message_type(message: &ProgressMessage) -> &'static str {
    match message {
        ProgressMessage::Log { .. } => "log",
        ProgressMessage::Progress { .. } => "progress",
        ProgressMessage::ArtifactReady { .. } => "artifact_ready",
        ProgressMessage::Done { .. } => "done",
        ProgressMessage::Error { .. } => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_labels() {
        assert_eq!(message_type(&ProgressMessage::progress(50)), "progress");
        assert_eq!(message_type(&ProgressMessage::done("s1")), "done");
        assert_eq!(message_type(&ProgressMessage::error("boom")), "error");
    }
}

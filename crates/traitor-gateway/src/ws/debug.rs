use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitStream, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use traitor_executor::{RunEvent, RunOutcome};
use traitor_protocol::{frames::DebugFrame, handshake::DebugStart};

use crate::app::AppState;
use crate::http::error::ApiError;
use crate::ws::send;

#[derive(Debug, Deserialize)]
pub struct DebugQuery {
    pub id: Option<String>,
}

/// Axum handler — upgrades HTTP to WebSocket at GET /api/debug.
pub async fn debug_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<DebugQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_debug(socket, query.id, state))
}

/// One connection, one debug session: stream the run, send `done`, close.
async fn run_debug(socket: WebSocket, job_id: Option<String>, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut tx, mut rx) = socket.split();

    let job_id = match job_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => {
            let wait = Duration::from_millis(state.config.debug.first_message_timeout_ms);
            match tokio::time::timeout(wait, first_job_id(&mut rx)).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    let e = ApiError::InvalidJob("expected a job id".to_string());
                    reject(&mut tx, &conn_id, &e).await;
                    return;
                }
                Err(_) => {
                    let e = ApiError::InvalidJob(format!(
                        "no job id received within {}ms",
                        wait.as_millis()
                    ));
                    reject(&mut tx, &conn_id, &e).await;
                    return;
                }
            }
        }
    };

    let mut session = match state.debug.start_session(&job_id, &conn_id).await {
        Ok(session) => session,
        Err(e) => {
            reject(&mut tx, &conn_id, &ApiError::from(e)).await;
            return;
        }
    };
    info!(
        conn_id,
        job_id = session.job_id(),
        session_id = %session.id(),
        run_id = session.run_id(),
        "debug connection attached"
    );

    loop {
        tokio::select! {
            event = session.next_event() => {
                match event {
                    Some(RunEvent::Output(chunk)) => {
                        let frame = DebugFrame::output(chunk.seq, chunk.stream.as_str(), chunk.text);
                        if send::frame(&mut tx, &frame).await.is_err() {
                            break;
                        }
                    }
                    Some(RunEvent::Finished(outcome)) => {
                        let _ = send::frame(&mut tx, &done_frame(&outcome)).await;
                        break;
                    }
                    None => break,
                }
            }

            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        info!(conn_id, job_id, "debug client disconnected, cancelling run");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    send::close(&mut tx).await;
    drop(session);
    info!(conn_id, job_id, "debug connection closed");
}

/// Wait for the first text message and read a job id from it.
async fn first_job_id(rx: &mut SplitStream<WebSocket>) -> Option<String> {
    loop {
        match rx.next().await? {
            Ok(Message::Text(text)) => return DebugStart::parse(text.as_str()).map(|s| s.job_id),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            _ => return None,
        }
    }
}

async fn reject(tx: &mut send::Sink, conn_id: &str, e: &ApiError) {
    warn!(conn_id, code = e.code(), "debug session refused: {e}");
    let _ = send::frame(tx, &DebugFrame::error(e.code(), &e.to_string())).await;
    send::close(tx).await;
}

pub(crate) fn done_frame(outcome: &RunOutcome) -> DebugFrame {
    DebugFrame::Done {
        status: outcome.status.to_string(),
        exit_code: outcome.exit_code,
        message: outcome.message.clone(),
        duration_ms: outcome.duration_ms,
    }
}

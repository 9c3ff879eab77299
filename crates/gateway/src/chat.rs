//! Chat endpoints.
//!
//! - `POST /api/chat`       : unary chat (accepted, answers with an empty body)
//! - `POST /api/chat/sse`   : run an agent, stream its events as SSE
//! - `GET  /api/chat/stream`: WebSocket; the first client frame is the chat
//!   request, every server frame is one JSON event

use agentloom_agent::{AgentError, AgentEvent, EventKind, RunHandle, RunRequest, RunUpdate, spawn_run};
use axum::{
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::{
        IntoResponse, Json,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use futures::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{debug, info, warn};

use crate::{ApiError, SharedState};

/// Body of the unary chat endpoint.
#[derive(Debug, Default, Serialize)]
pub struct ChatResponse {}

pub(crate) async fn chat_handler(Json(request): Json<RunRequest>) -> Result<Json<ChatResponse>, ApiError> {
    request.validate()?;
    debug!(agent_id = %request.agent_id, "Unary chat is not served; use the streaming endpoints");
    Ok(Json(ChatResponse::default()))
}

/// Build the requested agent and start it in the background.
async fn start_run(state: &SharedState, request: &RunRequest) -> Result<RunHandle, AgentError> {
    let executor = state.factory.for_request(state.store.as_ref(), request).await?;
    info!(
        agent_id = %request.agent_id,
        run_id = %executor.run_id(),
        strategy = executor.strategy_name(),
        "Starting streamed run"
    );
    Ok(spawn_run(executor, request.query.clone(), state.event_buffer))
}

/// The event to forward once a run has ended, if the run did not already
/// report its own outcome.
fn closing_event(result: &Result<String, AgentError>) -> Option<AgentEvent> {
    match result {
        Ok(_) => {
            debug!("Streamed run finished");
            None
        }
        Err(AgentError::Internal(reason)) => {
            warn!(error = %reason, "Streamed run ended abnormally");
            Some(AgentEvent::new(EventKind::Error, reason.clone(), 0))
        }
        Err(e) => {
            debug!(error = %e, "Streamed run ended with an error");
            None
        }
    }
}

fn sse_event(event: &AgentEvent) -> SseEvent {
    let data = serde_json::to_string(event).unwrap_or_default();
    SseEvent::default().event(event.kind.as_str()).data(data)
}

pub(crate) async fn chat_sse_handler(
    State(state): State<SharedState>,
    Json(request): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let handle = start_run(&state, &request).await?;

    // Dropping the stream drops the handle, which cancels the run.
    let stream = futures::stream::unfold(handle, |mut handle| async move {
        match handle.next().await? {
            RunUpdate::Event(event) => Some((Ok::<_, Infallible>(sse_event(&event)), handle)),
            RunUpdate::Finished(result) => {
                let event = closing_event(&result)?;
                Some((Ok(sse_event(&event)), handle))
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── WebSocket ─────────────────────────────────────────────────────────────

pub(crate) async fn chat_ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Decode the opening frame into a validated request.
fn parse_request(frame: &str) -> Result<RunRequest, String> {
    let request: RunRequest = serde_json::from_str(frame).map_err(|e| format!("Invalid chat request: {e}"))?;
    request.validate().map_err(|e| e.to_string())?;
    Ok(request)
}

fn event_frame(event: &AgentEvent) -> WsMessage {
    WsMessage::Text(serde_json::to_string(event).unwrap_or_default().into())
}

async fn handle_ws_connection(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    let opening = loop {
        match receiver.next().await {
            Some(Ok(WsMessage::Text(text))) => break parse_request(text.as_str()),
            Some(Ok(WsMessage::Binary(bytes))) => break parse_request(&String::from_utf8_lossy(&bytes)),
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return,
        }
    };

    let started = match opening {
        Ok(request) => start_run(&state, &request).await.map_err(|e| e.to_string()),
        Err(reason) => Err(reason),
    };
    let mut handle = match started {
        Ok(handle) => handle,
        Err(reason) => {
            warn!(error = %reason, "Rejected WebSocket chat");
            let _ = sender
                .send(event_frame(&AgentEvent::new(EventKind::Error, reason, 0)))
                .await;
            let _ = sender.send(WsMessage::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            update = handle.next() => match update {
                Some(RunUpdate::Event(event)) => {
                    if sender.send(event_frame(&event)).await.is_err() {
                        break;
                    }
                }
                Some(RunUpdate::Finished(result)) => {
                    if let Some(event) = closing_event(&result) {
                        let _ = sender.send(event_frame(&event)).await;
                    }
                    break;
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                    info!("WebSocket client went away; cancelling run");
                    break;
                }
                // Only the opening frame carries meaning.
                Some(Ok(_)) => {}
            },
        }
    }

    // An unfinished handle cancels its run on drop.
    drop(handle);
    let _ = sender.send(WsMessage::Close(None)).await;
}

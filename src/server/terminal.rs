//! Terminal WebSocket endpoint
//!
//! Each connection to `/terminal/{session_id}` owns one shell. PTY output is
//! relayed as text frames, and text or binary frames from the client are
//! written to the shell verbatim.

use std::path::PathBuf;

use axum::{
    extract::{
        ws::rejection::WebSocketUpgradeRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::error::{ApiError, ApiResult};
use super::extract::ApiQuery;
use super::protocol::{validate_id, TerminalQuery};
use super::routes::AppState;
use crate::pty::{ExitReason, ProcessExit, TerminalSize, Utf8Decoder};
use crate::shell::{ManagerError, SessionError};

/// `GET /terminal/{session_id}` (WebSocket upgrade)
///
/// Malformed ids, bad sizes and ids that are already live are refused before
/// the upgrade so the client sees a plain HTTP error.
pub async fn terminal_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiQuery(query): ApiQuery<TerminalQuery>,
) -> ApiResult<Response> {
    let ws = ws?;
    validate_id("session id", &session_id)?;
    let (cols, rows) = query.size()?;

    if state.shells.get(&session_id).await.is_some() {
        return Err(ApiError::conflict(format!(
            "Session already active: {}",
            session_id
        )));
    }

    let cwd = match query.cwd.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(raw) => match state.explorer.resolve_dir(raw).await {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Ignoring cwd '{}' for session {}: {}", raw, session_id, e);
                None
            }
        },
        None => None,
    };

    let size = TerminalSize::new(cols, rows);
    Ok(ws.on_upgrade(move |socket| handle_terminal_socket(socket, state, session_id, cwd, size)))
}

async fn handle_terminal_socket(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    cwd: Option<PathBuf>,
    size: TerminalSize,
) {
    let (mut sender, mut receiver) = socket.split();

    let (session, mut output_rx) = match state.shells.open(&session_id, cwd, size).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!("Failed to open session {}: {}", session_id, e);
            let message = format!("[server] Failed to start shell: {}\n", spawn_failure(&e));
            let _ = sender.send(Message::Text(message.into())).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    info!("Terminal session {} connected", session_id);

    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let mut decoder = Utf8Decoder::new();

    loop {
        tokio::select! {
            output = output_rx.recv() => match output {
                Some(output) => {
                    let text = decoder.decode(&output.data);
                    if text.is_empty() {
                        continue;
                    }
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let tail = decoder.finish();
                    if !tail.is_empty() {
                        let _ = sender.send(Message::Text(tail.into())).await;
                    }
                    if let Some(notice) = exit_notice(session.exit_info()) {
                        let _ = sender.send(Message::Text(notice.into())).await;
                    }
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = session.write_input(text.as_str().as_bytes()).await {
                        debug!("Dropping input for session {}: {}", session_id, e);
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Err(e) = session.write_input(&data).await {
                        debug!("Dropping input for session {}: {}", session_id, e);
                    }
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!("Terminal session {} disconnected", session_id);
                    break;
                }
                Some(Err(e)) => {
                    debug!("WebSocket error on session {}: {}", session_id, e);
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, closing session {}", session_id);
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state
        .shells
        .release(&session_id, session.connection_id())
        .await;
}

/// The underlying reason a session failed to open
fn spawn_failure(err: &ManagerError) -> String {
    match err {
        ManagerError::Session(SessionError::SpawnFailed(reason)) => reason.clone(),
        other => other.to_string(),
    }
}

/// Message sent when the shell ends on its own; `None` after a requested kill
fn exit_notice(exit: Option<ProcessExit>) -> Option<String> {
    match exit {
        Some(ProcessExit {
            reason: ExitReason::Killed,
            ..
        }) => None,
        Some(ProcessExit {
            exit_code: Some(code),
            ..
        }) => Some(format!("[server] Shell exited (code {})\n", code)),
        _ => Some("[server] Shell exited\n".to_string()),
    }
}

//! `WS /ws/scan/{id}` (spec §6, §4.9): live scan progress over a WebSocket,
//! falling back to `GET /scan/{id}/progress` for clients that poll instead.
//!
//! Browsers can't attach an `Authorization` header to a WebSocket handshake,
//! so the access token travels as a `?token=` query parameter and is
//! verified before the upgrade is accepted.

use crate::auth::{verify_token, TokenType};
use crate::errors::ApiResult;
use crate::progress::ScanEvent;
use crate::state::AppState;
use archon_core::error::ArchonError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::interval;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

fn authorize(state: &AppState, token: Option<&str>) -> ApiResult<()> {
    if state.config.disable_auth {
        return Ok(());
    }
    let token = token.ok_or(ArchonError::Unauthorized)?;
    verify_token(state, token, TokenType::Access)?;
    Ok(())
}

pub async fn scan_progress(
    State(state): State<AppState>,
    Path(scan_id): Path<i64>,
    Query(q): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, q.token.as_deref())?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, scan_id)))
}

/// Streams `ScanEvent`s for `scan_id` until the channel closes or the
/// client disconnects, then sends exactly one terminal frame.
async fn handle_socket(mut socket: WebSocket, state: AppState, scan_id: i64) {
    let mut rx = state.progress.subscribe(scan_id);
    let mut heartbeat = interval(Duration::from_millis(500));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let terminal = matches!(
                            event,
                            ScanEvent::Completed { .. } | ScanEvent::Failed { .. } | ScanEvent::Cancelled { .. }
                        );
                        if send_event(&mut socket, &event).await.is_err() {
                            return;
                        }
                        if terminal {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => continue,
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ScanEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(payload.into())).await
}

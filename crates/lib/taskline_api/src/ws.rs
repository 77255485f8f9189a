//! Websocket endpoint for the real-time channel.
//!
//! The credential is checked once, before the upgrade, from either
//! `Authorization: Bearer` or `?token=`. A failed handshake never reaches
//! the event router. After the upgrade the socket stays open even if the
//! access token later expires.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use taskline_core::auth::AuthError;
use taskline_core::models::auth::Principal;
use taskline_core::realtime::events::ServerEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{authenticate, bearer_token};

/// Query parameters for the websocket upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws` — authenticate, then upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let token = match query.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => token,
        Some(_) => return Err(AuthError::Unauthenticated.into()),
        None => bearer_token(&headers)?,
    };
    let principal = authenticate(&state, token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, principal, socket)))
}

/// Per-connection loop: forwards queued server events to the socket and
/// feeds client frames to the router, one at a time.
async fn handle_socket(state: AppState, principal: Principal, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let session = match state.events.connect(&principal, tx).await {
        Ok(session) => session,
        Err(e) => {
            warn!(principal_id = principal.id, error = %e, "rejecting socket after upgrade");
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode server event"),
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.events.handle_text(&session, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(connection_id = %session.connection_id, error = %e, "socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.events.disconnect(&session).await;
}

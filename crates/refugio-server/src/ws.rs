//! The real-time WebSocket endpoint.
//!
//! Credentials are checked before the upgrade completes; an
//! unauthenticated client never gets a socket. Each accepted connection
//! runs one read loop plus one forwarding task that drains the session's
//! outbox onto the wire.

use std::net::SocketAddr;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use refugio_engine::Session;
use refugio_shared::crypto;
use refugio_shared::protocol::{ClientEvent, ServerEvent};
use refugio_shared::types::Principal;

use crate::api::AppState;
use crate::error::ApiError;

/// Outbox depth per connection. Broadcasts beyond this are dropped for the
/// slow consumer instead of stalling the room.
const OUTBOX_DEPTH: usize = 256;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrade handler for `GET /ws?token=…`.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = query.token.as_deref().unwrap_or("");
    if token.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    let principal = state.verifier.verify(token)?;

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let origin = addr.ip().to_string();
    let fingerprint = crypto::device_fingerprint(&origin, &user_agent);

    info!(
        identity = %principal.identity,
        origin = %origin,
        "WebSocket session accepted"
    );

    Ok(ws.on_upgrade(move |socket| {
        handle_socket(state, socket, principal, fingerprint, origin)
    }))
}

async fn handle_socket(
    state: AppState,
    socket: WebSocket,
    principal: Principal,
    fingerprint: String,
    origin: String,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOX_DEPTH);

    // Drain the session outbox onto the wire until either side goes away.
    let forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(principal, fingerprint, origin, tx);
    let engine = state.engine.clone();

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session = %session.id, error = %e, "Socket error, closing");
                break;
            }
        };

        match frame {
            Message::Text(raw) => match serde_json::from_str::<ClientEvent>(&raw) {
                Ok(event) => engine.handle_event(&mut session, event).await,
                Err(e) => {
                    debug!(session = %session.id, error = %e, "Unparseable client event");
                    session.push(&ServerEvent::Error {
                        message: "Malformed event".to_string(),
                    });
                }
            },
            Message::Close(_) => break,
            // Ping/pong is handled by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    engine.disconnect(&mut session).await;
    forward.abort();
    debug!(session = %session.id, "WebSocket session closed");
}

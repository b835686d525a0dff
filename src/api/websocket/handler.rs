//! WebSocket connection handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use super::state::AppState;
use crate::api::auth::{HandshakeParams, Identity};

/// WebSocket upgrade handler.
///
/// Credentials are checked before the upgrade; a missing user id or token
/// refuses the connection with 401 before any event is processed.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HandshakeParams>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let identity = match state.verifier.authenticate(&params, authorization) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("handshake rejected: {}", e);
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, identity)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Drive one connection until it closes, then run disconnect cleanup
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (connection_id, mut rx) = state.router.connect(&identity.user_id);

    let mut heartbeat = interval(state.config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            // Events queued for this connection
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    Err(e) => error!("failed to encode {} event: {}", event.name(), e),
                }
            }

            // Frames from the client
            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        last_seen = Instant::now();
                        if !handle_client_message(msg, &state, &connection_id) {
                            break; // Client requested close
                        }
                    }
                    Some(Err(e)) => {
                        debug!(connection = %connection_id, "websocket error: {}", e);
                        break;
                    }
                    None => break, // Client disconnected
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > state.config.heartbeat_timeout {
                    warn!(connection = %connection_id, "heartbeat timeout");
                    break;
                }
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.router.disconnect(&connection_id);
}

/// Handle a frame from the client.
/// Returns false if the connection should be closed
fn handle_client_message(msg: Message, state: &AppState, connection_id: &str) -> bool {
    match msg {
        Message::Text(text) => {
            state.router.handle_text(connection_id, &text);
            true
        }
        Message::Binary(_) => true, // Ignore binary frames
        // Pongs are queued by the transport itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}

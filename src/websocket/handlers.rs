use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::security::jwt;
use crate::services::user_service::UserService;
use crate::state::AppState;
use crate::websocket::events::{InboundEvent, OutboundEvent};
use crate::websocket::ConnectionId;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Websocket entry point. The identity of the connection is taken from
/// the token, either as a `token` query parameter or a bearer header;
/// clients never announce their own user id.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.or_else(|| bearer_token(&headers));
    let user_id = match token.as_deref() {
        Some(token) => match jwt::verify_token(token, &state.config.jwt_secret) {
            Ok(user_id) => user_id,
            Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
        },
        None => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let (conn_id, was_first, mut rx) = state.registry.connect(user_id).await;
    info!(%user_id, conn_id, "websocket connected");

    // Presence flips only on the first connection of a user; a second
    // device attaching does not re-announce. The flag comes from the
    // registry itself, decided under its lock.
    if was_first {
        if let Err(e) = UserService::set_online(&state.db, user_id).await {
            warn!(error = %e, %user_id, "failed to mark user online");
        }
        broadcast_presence(&state, user_id, true).await;
    }

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundEvent>(&text) {
                            Ok(event) => handle_inbound(&state, user_id, conn_id, event).await,
                            Err(e) => debug!(error = %e, %user_id, "unparseable client event"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(error = %e, %user_id, "websocket read error");
                        break;
                    }
                    // Pings are answered by axum itself
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let was_last = state.registry.disconnect(user_id, conn_id).await;
    info!(%user_id, conn_id, was_last, "websocket disconnected");
    if was_last {
        if let Err(e) = UserService::set_offline(&state.db, user_id).await {
            warn!(error = %e, %user_id, "failed to mark user offline");
        }
        broadcast_presence(&state, user_id, false).await;
    }
}

async fn handle_inbound(
    state: &AppState,
    user_id: Uuid,
    conn_id: ConnectionId,
    event: InboundEvent,
) {
    match event {
        InboundEvent::RoomJoin { room_id } => {
            state.registry.join_room(&room_id, conn_id).await;
        }
        InboundEvent::TypingStart { room_id } => {
            let event = OutboundEvent::TypingStarted {
                room_id: room_id.clone(),
                user_id,
            };
            relay_to_room(state, &room_id, conn_id, event).await;
        }
        InboundEvent::TypingStop { room_id } => {
            let event = OutboundEvent::TypingStopped {
                room_id: room_id.clone(),
                user_id,
            };
            relay_to_room(state, &room_id, conn_id, event).await;
        }
    }
}

async fn relay_to_room(
    state: &AppState,
    room_id: &str,
    origin: ConnectionId,
    event: OutboundEvent,
) {
    match event.to_ws_message() {
        Ok(msg) => state.registry.broadcast_room(room_id, msg, Some(origin)).await,
        Err(e) => warn!(error = %e, "failed to serialize room event"),
    }
}

async fn broadcast_presence(state: &AppState, user_id: Uuid, is_online: bool) {
    let event = OutboundEvent::PresenceChanged { user_id, is_online };
    match event.to_ws_message() {
        Ok(msg) => state.registry.broadcast_all(msg, Some(user_id)).await,
        Err(e) => warn!(error = %e, "failed to serialize presence event"),
    }
}

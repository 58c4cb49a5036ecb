// Collaboration broker: one WebSocket connection per open file, fanning
// events out to the other members of that file's room.
//
// The socket channel carries live edits, cursor moves and presence only;
// persistence happens on the HTTP write path. Malformed or unrecognized
// frames are dropped without closing the connection so older hubs keep
// working against newer clients.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use coedit_common::protocol::ws::{
    decode_event, encode_event, username_or_guest, ClientEvent, PresenceAction, ServerEvent,
};
use coedit_common::types::FileId;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{request_id_from_headers_or_generate, with_request_id_scope};
use crate::rooms::RoomRegistry;

const HEARTBEAT_INTERVAL_MS: u32 = 15_000;
const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
const MAX_FRAME_BYTES: u32 = 262_144;

#[derive(Clone)]
pub struct BrokerState {
    registry: Arc<RoomRegistry>,
}

pub fn router(registry: Arc<RoomRegistry>) -> Router {
    Router::new()
        .route("/ws/files/{file_id}", get(ws_upgrade))
        .with_state(BrokerState { registry })
}

pub async fn ws_upgrade(
    Path(file_id): Path<String>,
    State(state): State<BrokerState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let file_id = FileId::from(file_id);
    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_frame_size(MAX_FRAME_BYTES as usize).on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handle_socket(state.registry, file_id, socket)).await;
    })
}

async fn handle_socket(registry: Arc<RoomRegistry>, file_id: FileId, mut socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let mut outbound_receiver = registry.join(&file_id, conn_id).await;

    // Heartbeat: server pings every HEARTBEAT_INTERVAL_MS and disconnects
    // only when a previously sent ping went unanswered for longer than
    // HEARTBEAT_TIMEOUT_MS. The timeout clock starts at the ping, never
    // at connect, so idle-but-responsive clients stay connected.
    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS as u64));
    heartbeat_interval.reset(); // skip immediate first tick
    let mut pending_ping: Option<Instant> = None;
    let heartbeat_timeout = std::time::Duration::from_millis(HEARTBEAT_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if let Some(ping_sent_at) = pending_ping {
                    if ping_sent_at.elapsed() > heartbeat_timeout {
                        warn!(
                            file_id = %file_id,
                            conn_id = %conn_id,
                            "heartbeat timeout, disconnecting"
                        );
                        break;
                    }
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
                pending_ping = Some(Instant::now());
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(outbound_event) => {
                        if send_event(&mut socket, &outbound_event).await.is_err() {
                            break;
                        }
                    }
                    // Sender side dropped: force-disconnected as a slow
                    // consumer, or the registry shut down.
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_frame)) => {
                        let inbound = match decode_event(&raw_frame) {
                            Ok(event) => event,
                            Err(error) => {
                                debug!(
                                    file_id = %file_id,
                                    conn_id = %conn_id,
                                    error = %error,
                                    "dropping undecodable frame"
                                );
                                continue;
                            }
                        };
                        handle_client_event(&registry, &file_id, conn_id, inbound).await;
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        pending_ping = None;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    // Single cleanup point: every exit path lands here exactly once.
    registry.leave(&file_id, conn_id).await;
    debug!(file_id = %file_id, conn_id = %conn_id, "connection closed");
}

async fn handle_client_event(
    registry: &RoomRegistry,
    file_id: &FileId,
    conn_id: Uuid,
    event: ClientEvent,
) {
    match event {
        ClientEvent::FileUpdate { content } => {
            registry.broadcast(file_id, conn_id, ServerEvent::FileUpdate { content }).await;
        }
        ClientEvent::CursorUpdate { username, position } => {
            let announced = announced_username(username);
            registry
                .update_member(file_id, conn_id, announced.as_deref(), Some(position.clone()))
                .await;
            let username = username_or_guest(announced);
            registry
                .broadcast(file_id, conn_id, ServerEvent::CursorUpdate { username, position })
                .await;
        }
        ClientEvent::PresenceJoin { username } => {
            let announced = announced_username(username);
            registry.update_member(file_id, conn_id, announced.as_deref(), None).await;
            let username = username_or_guest(announced);
            registry
                .broadcast(
                    file_id,
                    conn_id,
                    ServerEvent::Presence { action: PresenceAction::Join, username },
                )
                .await;
        }
        ClientEvent::PresenceLeave { username } => {
            let announced = announced_username(username);
            registry.update_member(file_id, conn_id, announced.as_deref(), None).await;
            let username = username_or_guest(announced);
            registry
                .broadcast(
                    file_id,
                    conn_id,
                    ServerEvent::Presence { action: PresenceAction::Leave, username },
                )
                .await;
        }
    }
}

/// A name the client actually announced; blank names count as absent so
/// they never clobber a previously stored one.
fn announced_username(username: Option<String>) -> Option<String> {
    username.filter(|name| !name.trim().is_empty())
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let encoded = encode_event(event).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}

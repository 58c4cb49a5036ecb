// WebSocket event types for the coedit file-collaboration protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display name used when a client never announced one.
pub const GUEST_USERNAME: &str = "Guest";

/// Client -> server events on a file room connection.
///
/// Decoding is permissive: unknown fields are ignored, and a frame whose
/// `type` tag is unrecognized fails to decode and is dropped by the hub
/// without closing the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Live content of the sender's editor buffer. Fan-out only — the
    /// socket channel never persists content.
    FileUpdate { content: String },

    /// Cursor moved. `position` is opaque to the hub and forwarded as-is.
    CursorUpdate {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        position: Value,
    },

    /// Sender announces themselves to the rest of the room.
    PresenceJoin {
        #[serde(default)]
        username: Option<String>,
    },

    /// Sender announces departure (the connection may stay open).
    PresenceLeave {
        #[serde(default)]
        username: Option<String>,
    },
}

/// Server -> client events fanned out to the other members of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    FileUpdate { content: String },
    CursorUpdate { username: String, position: Value },
    Presence { action: PresenceAction, username: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    Join,
    Leave,
}

pub fn decode_event(raw: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str::<ClientEvent>(raw)
}

pub fn encode_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Normalizes the optional username carried by cursor and presence
/// events. Absent or blank names collapse to [`GUEST_USERNAME`].
pub fn username_or_guest(username: Option<String>) -> String {
    match username {
        Some(name) if !name.trim().is_empty() => name,
        _ => GUEST_USERNAME.to_owned(),
    }
}

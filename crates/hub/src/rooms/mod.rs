// In-memory registry of per-file collaboration rooms.
//
// A room exists exactly as long as it has at least one member; the last
// leave deletes the entry so a long-running process never accumulates
// empty rooms. Membership mutations serialize on the registry map lock,
// while broadcast iteration takes only the target room's member lock, so
// fan-out in one room never contends with fan-out in another.

use std::collections::HashMap;
use std::sync::Arc;

use coedit_common::protocol::ws::{ServerEvent, GUEST_USERNAME};
use coedit_common::types::FileId;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound events buffered per member before the hub gives up on a slow
/// consumer and disconnects it rather than stalling the broadcaster.
pub(crate) const OUTBOUND_BUFFER_EVENTS: usize = 64;

#[derive(Debug)]
struct Member {
    username: String,
    cursor: Option<Value>,
    outbound: mpsc::Sender<ServerEvent>,
}

#[derive(Debug, Default)]
struct Room {
    members: RwLock<HashMap<Uuid, Member>>,
}

/// Point-in-time view of one room member, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub conn_id: Uuid,
    pub username: String,
    pub cursor: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub active_rooms: usize,
    pub active_connections: usize,
}

/// Maps file identifiers to the set of currently connected members.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<FileId, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the room for `file_id`, creating the room on
    /// first join. Returns the receiving end of the member's outbound
    /// event queue; the registry keeps the sending end.
    ///
    /// The member is inserted while the map lock is held so a racing
    /// last-member leave cannot delete the room out from under the join.
    pub async fn join(&self, file_id: &FileId, conn_id: Uuid) -> mpsc::Receiver<ServerEvent> {
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER_EVENTS);
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(file_id.clone()).or_default();
        room.members.write().await.insert(
            conn_id,
            Member { username: GUEST_USERNAME.to_owned(), cursor: None, outbound: sender },
        );
        debug!(file_id = %file_id, conn_id = %conn_id, "member joined room");
        receiver
    }

    /// Removes a connection from its room, deleting the room once empty.
    /// Unknown rooms and members are ignored — the room may already be
    /// gone when a disconnect races the last leave.
    pub async fn leave(&self, file_id: &FileId, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(file_id) else {
            return;
        };

        let now_empty = {
            let mut members = room.members.write().await;
            members.remove(&conn_id);
            members.is_empty()
        };

        if now_empty {
            rooms.remove(file_id);
            debug!(file_id = %file_id, "room emptied and removed");
        }
    }

    /// Delivers `event` to every member of the room except the sender,
    /// returning how many members it was queued for. Sends never block:
    /// a member whose outbound buffer is full is disconnected instead of
    /// stalling the broadcast. A missing room is a no-op.
    pub async fn broadcast(
        &self,
        file_id: &FileId,
        sender_conn_id: Uuid,
        event: ServerEvent,
    ) -> usize {
        let Some(room) = self.room(file_id).await else {
            return 0;
        };

        let mut delivered = 0;
        let mut stalled = Vec::new();
        {
            let members = room.members.read().await;
            for (conn_id, member) in members.iter() {
                if *conn_id == sender_conn_id {
                    continue;
                }
                match member.outbound.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => stalled.push(*conn_id),
                    // Receiver already dropped; its connection task is
                    // winding down and will deregister itself.
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
        }

        for conn_id in stalled {
            warn!(
                file_id = %file_id,
                conn_id = %conn_id,
                "outbound buffer full, disconnecting slow member"
            );
            self.leave(file_id, conn_id).await;
        }

        delivered
    }

    /// Records the display name and cursor position for a member. Either
    /// field is only touched when the event actually carried it, so an
    /// anonymous cursor move never clobbers an announced name. Missing
    /// rooms or members are ignored.
    pub async fn update_member(
        &self,
        file_id: &FileId,
        conn_id: Uuid,
        username: Option<&str>,
        cursor: Option<Value>,
    ) {
        let Some(room) = self.room(file_id).await else {
            return;
        };
        let mut members = room.members.write().await;
        if let Some(member) = members.get_mut(&conn_id) {
            if let Some(name) = username {
                member.username = name.to_owned();
            }
            if let Some(position) = cursor {
                member.cursor = Some(position);
            }
        }
    }

    /// Snapshot of the members currently in the room for `file_id`.
    pub async fn participants(&self, file_id: &FileId) -> Vec<Participant> {
        let Some(room) = self.room(file_id).await else {
            return Vec::new();
        };
        let members = room.members.read().await;
        let mut participants = members
            .iter()
            .map(|(conn_id, member)| Participant {
                conn_id: *conn_id,
                username: member.username.clone(),
                cursor: member.cursor.clone(),
            })
            .collect::<Vec<_>>();
        participants.sort_by_key(|participant| participant.conn_id);
        participants
    }

    pub async fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.read().await;
        let mut stats = RegistryStats { active_rooms: rooms.len(), active_connections: 0 };
        for room in rooms.values() {
            stats.active_connections += room.members.read().await.len();
        }
        stats
    }

    /// Drops every room and member. Connection tasks observe their
    /// outbound channel closing and shut down; used on server shutdown.
    pub async fn shutdown(&self) {
        let mut rooms = self.rooms.write().await;
        let drained = rooms.len();
        rooms.clear();
        if drained > 0 {
            debug!(rooms = drained, "registry shut down, all rooms dropped");
        }
    }

    async fn room(&self, file_id: &FileId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(file_id).cloned()
    }
}

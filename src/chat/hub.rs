//! Connection hub: fan-out and connection lifecycle.
//!
//! The hub owns the per-connection outbound channels plus the presence and
//! membership registries, and is the single place events get serialized and
//! delivered. Each connection hands over an unbounded sender at connect time;
//! its websocket writer task drains the other end.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::auth::Identity;

use super::presence::PresenceRegistry;
use super::protocol::{OnlineUser, ServerEvent};
use super::rooms::RoomMembership;
use super::ConnId;

/// Everything the event router needs to know about one live connection.
pub struct ConnCtx {
    pub conn: ConnId,
    pub identity: Identity,
}

#[derive(Default)]
pub struct Hub {
    presence: PresenceRegistry,
    rooms: RoomMembership,
    peers: Mutex<HashMap<ConnId, UnboundedSender<String>>>,
    /// Per-room sequencing locks, created lazily. Held across
    /// append + broadcast so delivery order matches persisted order.
    room_seq: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Hub {
    pub fn new() -> Hub {
        Hub::default()
    }

    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Bring an authenticated connection online: register it, auto-join its
    /// personal room, and tell everyone the online list changed.
    pub fn connect(&self, identity: Identity, tx: UnboundedSender<String>) -> ConnCtx {
        let conn = Uuid::now_v7();
        self.peers.lock().insert(conn, tx);

        if self.presence.register(&identity, conn) {
            tracing::info!("user connected: {} ({})", identity.username, identity.id);
        }
        // Personal room doubles as the identity's notification mailbox.
        self.rooms.join(conn, &identity.id);

        self.broadcast_all(&ServerEvent::GetOnlineUsers(self.presence.list_online()));
        ConnCtx { conn, identity }
    }

    /// Take a connection out of every shared structure, then announce the
    /// presence change. Safe to call exactly once per connection.
    pub fn disconnect(&self, ctx: &ConnCtx) {
        self.rooms.teardown(ctx.conn);
        if self.presence.unregister(&ctx.identity.id, ctx.conn) {
            tracing::info!("user disconnected: {}", ctx.identity.username);
        }
        self.peers.lock().remove(&ctx.conn);

        self.broadcast_all(&ServerEvent::GetOnlineUsers(self.presence.list_online()));
    }

    pub fn online_users(&self) -> Vec<OnlineUser> {
        self.presence.list_online()
    }

    /// Sequencing lock for a room's send path.
    pub fn room_lock(&self, room_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.room_seq
            .lock()
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn send_to(&self, conn: ConnId, event: &ServerEvent) {
        let Some(frame) = frame(event) else { return };
        if let Some(tx) = self.peers.lock().get(&conn) {
            // A closed channel just means the peer is mid-disconnect.
            let _ = tx.send(frame);
        }
    }

    pub fn broadcast_all(&self, event: &ServerEvent) {
        let Some(frame) = frame(event) else { return };
        for tx in self.peers.lock().values() {
            let _ = tx.send(frame.clone());
        }
    }

    pub fn broadcast_room(&self, room_id: &str, event: &ServerEvent) {
        self.deliver(self.rooms.members_of(room_id), None, event);
    }

    /// Room broadcast that skips the originating connection; typing
    /// indicators never echo back to their sender.
    pub fn broadcast_room_except(&self, room_id: &str, except: ConnId, event: &ServerEvent) {
        self.deliver(self.rooms.members_of(room_id), Some(except), event);
    }

    fn deliver(&self, members: Vec<ConnId>, except: Option<ConnId>, event: &ServerEvent) {
        let Some(frame) = frame(event) else { return };
        let peers = self.peers.lock();
        for conn in members {
            if Some(conn) == except {
                continue;
            }
            if let Some(tx) = peers.get(&conn) {
                let _ = tx.send(frame.clone());
            }
        }
    }
}

/// Serialize once per event, clone per recipient.
fn frame(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::error!("failed to serialize outbound event: {err}");
            None
        }
    }
}

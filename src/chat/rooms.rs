//! Room names and membership.
//!
//! A room is nothing but a string key. Public rooms are well-known names;
//! private rooms are derived from the two participant ids so both sides
//! compute the same name without any registration step. Membership is
//! per-connection set membership, tracked in both directions so broadcast
//! and disconnect teardown are both cheap.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::ConnId;

/// The default public room. Messages here never trigger private
/// notifications, whatever their receiver field says.
pub const GENERAL_ROOM: &str = "general";

/// Canonical private-room name for a pair of identities. Symmetric in its
/// arguments: the ids are sorted before joining.
pub fn derive_private_room(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("private_{lo}_{hi}")
}

#[derive(Default)]
struct Inner {
    members: HashMap<String, HashSet<ConnId>>,
    joined: HashMap<ConnId, HashSet<String>>,
}

#[derive(Default)]
pub struct RoomMembership {
    inner: Mutex<Inner>,
}

impl RoomMembership {
    pub fn new() -> RoomMembership {
        RoomMembership::default()
    }

    /// Joining is the only thing that authorizes a connection to receive a
    /// room's broadcasts.
    pub fn join(&self, conn: ConnId, room_id: &str) {
        let mut inner = self.inner.lock();
        inner.members.entry(room_id.to_string()).or_default().insert(conn);
        inner.joined.entry(conn).or_default().insert(room_id.to_string());
    }

    /// Idempotent: leaving a room the connection never joined is a no-op.
    pub fn leave(&self, conn: ConnId, room_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(members) = inner.members.get_mut(room_id) {
            members.remove(&conn);
            if members.is_empty() {
                inner.members.remove(room_id);
            }
        }
        if let Some(rooms) = inner.joined.get_mut(&conn) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                inner.joined.remove(&conn);
            }
        }
    }

    /// Remove the connection from every room it belongs to. Called on
    /// disconnect, before anything else can try to deliver to it.
    pub fn teardown(&self, conn: ConnId) {
        let mut inner = self.inner.lock();
        let Some(rooms) = inner.joined.remove(&conn) else {
            return;
        };
        for room_id in rooms {
            if let Some(members) = inner.members.get_mut(&room_id) {
                members.remove(&conn);
                if members.is_empty() {
                    inner.members.remove(&room_id);
                }
            }
        }
    }

    pub fn members_of(&self, room_id: &str) -> Vec<ConnId> {
        self.inner
            .lock()
            .members
            .get(room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, conn: ConnId, room_id: &str) -> bool {
        self.inner
            .lock()
            .joined
            .get(&conn)
            .is_some_and(|rooms| rooms.contains(room_id))
    }
}

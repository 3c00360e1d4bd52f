//! Who is online.
//!
//! Tracks live connections per identity. The registry is connection-level
//! internally (one user can have several tabs open) but only ever exposes the
//! aggregated identity-level view: a user is online iff they have at least
//! one registered connection. In-memory only, scoped to process lifetime.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::auth::Identity;

use super::protocol::OnlineUser;
use super::ConnId;

struct Entry {
    username: String,
    conns: HashSet<ConnId>,
}

#[derive(Default)]
pub struct PresenceRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl PresenceRegistry {
    pub fn new() -> PresenceRegistry {
        PresenceRegistry::default()
    }

    /// Add a connection under the identity. Returns true if this was the
    /// identity's first live connection (it just came online).
    pub fn register(&self, identity: &Identity, conn: ConnId) -> bool {
        let mut entries = self.entries.lock();
        let entry = entries.entry(identity.id.clone()).or_insert_with(|| Entry {
            username: identity.username.clone(),
            conns: HashSet::new(),
        });
        let first = entry.conns.is_empty();
        entry.conns.insert(conn);
        first
    }

    /// Remove a connection. Returns true if the identity dropped to zero
    /// connections (it just went offline); its entry is removed entirely.
    pub fn unregister(&self, user_id: &str, conn: ConnId) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(user_id) else {
            return false;
        };
        entry.conns.remove(&conn);
        if entry.conns.is_empty() {
            entries.remove(user_id);
            true
        } else {
            false
        }
    }

    /// Snapshot of everyone online, deduplicated by identity.
    pub fn list_online(&self) -> Vec<OnlineUser> {
        self.entries
            .lock()
            .iter()
            .map(|(id, entry)| OnlineUser { id: id.clone(), username: entry.username.clone() })
            .collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.entries.lock().contains_key(user_id)
    }
}

//! Room membership: which connections are subscribed to which group's events.
//!
//! Rooms track *connections*, not identities; whether the identity behind a
//! connection may join a group is validated by the engine against persisted
//! membership before `join` is called.
//!
//! A reverse index (connection -> rooms) keeps disconnect cleanup
//! proportional to the rooms that connection actually joined. Stale entries
//! here are the classic source of ghost broadcasts, so `drop_connection` is
//! the only cleanup path and it walks the reverse index, never all rooms.

use crate::state::ConnectionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;

/// Group-room subscription registry.
pub struct RoomRegistry {
    /// Group id -> subscribed connections.
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// Connection -> rooms it joined (for O(rooms-of-connection) cleanup).
    memberships: DashMap<ConnectionId, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Subscribe a connection to a group room. Idempotent.
    pub fn join(&self, group_id: &str, connection_id: ConnectionId) {
        self.rooms
            .entry(group_id.to_string())
            .or_default()
            .insert(connection_id);
        self.memberships
            .entry(connection_id)
            .or_default()
            .insert(group_id.to_string());
    }

    /// Unsubscribe a connection from a group room. Empty rooms are removed
    /// within the same entry guard.
    pub fn leave(&self, group_id: &str, connection_id: ConnectionId) {
        if let Entry::Occupied(mut occupied) = self.rooms.entry(group_id.to_string()) {
            occupied.get_mut().remove(&connection_id);
            if occupied.get().is_empty() {
                occupied.remove();
            }
        }
        if let Entry::Occupied(mut occupied) = self.memberships.entry(connection_id) {
            occupied.get_mut().remove(group_id);
            if occupied.get().is_empty() {
                occupied.remove();
            }
        }
    }

    /// Connections currently subscribed to a room (cloned; guard dropped).
    pub fn members_of(&self, group_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(group_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a connection from every room it joined. Returns the rooms it
    /// was removed from.
    pub fn drop_connection(&self, connection_id: ConnectionId) -> Vec<String> {
        let Some((_, joined)) = self.memberships.remove(&connection_id) else {
            return Vec::new();
        };
        for group_id in &joined {
            if let Entry::Occupied(mut occupied) = self.rooms.entry(group_id.clone()) {
                occupied.get_mut().remove(&connection_id);
                if occupied.get().is_empty() {
                    occupied.remove();
                }
            }
        }
        joined.into_iter().collect()
    }

    /// Tear down a whole room (group deleted), clearing reverse entries.
    pub fn remove_room(&self, group_id: &str) {
        let Some((_, members)) = self.rooms.remove(group_id) else {
            return;
        };
        for connection_id in members {
            if let Entry::Occupied(mut occupied) = self.memberships.entry(connection_id) {
                occupied.get_mut().remove(group_id);
                if occupied.get().is_empty() {
                    occupied.remove();
                }
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

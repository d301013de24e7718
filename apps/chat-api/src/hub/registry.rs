//! Room → live connections registry for this process.
//!
//! One `RwLock` guards the whole map: add/remove take it exclusively, broadcast
//! snapshots take it shared. Guards are never held across an `.await`. If the
//! lock ever shows up as contended, shard the map by a hash of the room id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::connection::Connection;

pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<String, HashMap<String, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection under its own room.
    pub fn add(&self, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write();
        rooms
            .entry(conn.room().to_string())
            .or_default()
            .insert(conn.id().to_string(), conn);
    }

    /// Remove a connection. Removing an absent connection is a no-op.
    ///
    /// Returns `true` if the connection was registered. A room left empty is
    /// dropped from the map.
    pub fn remove(&self, room: &str, conn: &Connection) -> bool {
        let mut rooms = self.rooms.write();
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(conn.id()).is_some();
        if members.is_empty() {
            rooms.remove(room);
        }
        removed
    }

    /// Point-in-time copy of a room's connections.
    pub fn snapshot(&self, room: &str) -> Vec<Arc<Connection>> {
        let rooms = self.rooms.read();
        rooms
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self, room: &str) -> usize {
        self.rooms.read().get(room).map_or(0, HashMap::len)
    }

    /// Number of rooms with at least one connection.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Whether `user_id` still has any connection in `room`.
    pub fn user_connected(&self, room: &str, user_id: &str) -> bool {
        self.rooms
            .read()
            .get(room)
            .is_some_and(|members| members.values().any(|c| c.user_id() == user_id))
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
